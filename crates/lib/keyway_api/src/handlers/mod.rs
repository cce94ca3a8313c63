//! Request handlers.

pub mod auth;
pub mod handoff;
pub mod health;
pub mod session;
