//! Business logic behind the HTTP handlers.

pub mod callback;
pub mod cookies;
pub mod handoff;
pub mod login;
pub mod logout;
pub mod session;
