//! Auth server client module.
//!
//! This module provides the `AuthGateway` for signing in and registering
//! against the BMDInfo auth server, which answers with a bearer token and
//! the user record.

pub mod client;
pub mod error;

pub use client::{AuthBackend, AuthGateway, HttpAuthBackend};
pub use error::AuthError;
