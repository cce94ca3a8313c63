//! # keyway_core
//!
//! Core broker logic for Keyway: credential minting and validation, cookie
//! scope policy, browser sessions, back-channel handoff tickets and the
//! identity provider capability.

pub mod auth;
pub mod config;
pub mod cookies;
pub mod handoff;
pub mod idp;
pub mod models;
pub mod redirect;
pub mod session;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
