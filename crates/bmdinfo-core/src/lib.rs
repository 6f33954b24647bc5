//! Core library for the BMDInfo client.
//!
//! Keeps the signed-in session consistent between durable storage and the
//! in-memory auth state, and decides which routes a visitor may enter.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod routes;

pub use api::{AuthBackend, AuthError, AuthGateway, HttpAuthBackend};
pub use auth::{AuthStateBroadcaster, Environment, Navigation, SessionManager, SessionStore};
pub use config::Config;
pub use models::{AuthResponse, LoginRequest, RegisterRequest, User};
pub use routes::{GuardDecision, RouteGuard};
