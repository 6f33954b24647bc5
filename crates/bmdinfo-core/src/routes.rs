//! Route table and the access guard for protected routes.
//!
//! Routes mirror the web client: the login and register pages are public,
//! everything under `/dashboard` requires a live session. The guard reads
//! the store and checks the token on every call; nothing is cached.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::auth::{token, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Normalized path without leading or trailing slashes
    pub path: &'static str,
    pub title: &'static str,
    pub protected: bool,
}

const ROUTES: &[Route] = &[
    Route { path: "", title: "Login Page", protected: false },
    Route { path: "login", title: "Login Page", protected: false },
    Route { path: "register", title: "Register", protected: false },
    Route { path: "dashboard", title: "Dashboard", protected: true },
    Route { path: "dashboard/dashboard", title: "Dashboard", protected: true },
    Route { path: "dashboard/bid-tracker", title: "Bid Tracker", protected: true },
];

/// Strip query, fragment and surrounding slashes.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].trim_matches('/')
}

/// Look up the route for `path`, if the client has one.
pub fn resolve(path: &str) -> Option<Route> {
    let path = normalize(path);
    ROUTES.iter().copied().find(|r| r.path == path)
}

/// The login page, rendered at whatever path is configured for it.
pub fn login_route() -> Route {
    ROUTES[1]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Nothing stored
    NoSession,
    /// A token is stored but is expired or unreadable
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect { to: String, reason: DenyReason },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Proceed)
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    store: SessionStore,
    login_path: String,
}

impl RouteGuard {
    pub fn new(store: SessionStore, login_path: impl Into<String>) -> Self {
        Self {
            store,
            login_path: login_path.into(),
        }
    }

    /// Whether `path` is the root or the configured login page.
    pub fn is_login_route(&self, path: &str) -> bool {
        let path = normalize(path);
        path.is_empty() || path == normalize(&self.login_path)
    }

    /// Decide entry into a protected route as of now.
    pub fn check(&self) -> GuardDecision {
        self.check_at(Utc::now())
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> GuardDecision {
        let reason = match self.store.token() {
            None => DenyReason::NoSession,
            Some(t) if token::is_valid_at(&t, now) => return GuardDecision::Proceed,
            Some(_) => DenyReason::InvalidToken,
        };
        debug!(?reason, to = %self.login_path, "Guard denied entry");
        GuardDecision::Redirect {
            to: self.login_path.clone(),
            reason,
        }
    }
}
