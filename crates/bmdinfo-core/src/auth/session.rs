use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::state::{AuthStateBroadcaster, Subscription};
use super::store::{Environment, SessionStore};
use super::token;
use crate::api::{AuthBackend, AuthError, AuthGateway, HttpAuthBackend};
use crate::config::Config;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};
use crate::routes::{self, DenyReason, GuardDecision, Route, RouteGuard};

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Rendered(Route),
    Redirected { from: String, to: String },
    NotFound(String),
}

/// Owns the session for one running client.
///
/// Built once at startup and handed to whatever needs it. The store is the
/// recovery cache; the broadcaster holds the authoritative current user.
pub struct SessionManager {
    config: Config,
    store: SessionStore,
    state: AuthStateBroadcaster,
    gateway: AuthGateway,
    guard: RouteGuard,
}

impl SessionManager {
    pub fn new(config: Config, store: SessionStore, backend: Arc<dyn AuthBackend>) -> Self {
        let state = AuthStateBroadcaster::from_store(&store);
        let gateway = AuthGateway::new(backend, store.clone(), state.clone());
        let guard = RouteGuard::new(store.clone(), config.login_path.clone());
        Self {
            config,
            store,
            state,
            gateway,
            guard,
        }
    }

    /// Build a manager talking HTTP to the configured server.
    pub fn from_config(config: Config, environment: Environment) -> Result<Self> {
        let store = SessionStore::for_environment(environment, &config)?;
        let backend = Arc::new(HttpAuthBackend::new(&config)?);
        debug!(?environment, api = %config.api_base_url, "Session manager created");
        Ok(Self::new(config, store, backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> &AuthStateBroadcaster {
        &self.state
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.current()
    }

    #[must_use = "dropping the Subscription unsubscribes the observer"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        self.state.subscribe(observer)
    }

    pub fn token(&self) -> Option<String> {
        self.store.token()
    }

    /// A token is stored and has not expired.
    pub fn is_authenticated(&self) -> bool {
        self.token().map(|t| token::is_valid(&t)).unwrap_or(false)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError> {
        self.gateway.login(request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        self.gateway.register(request).await
    }

    /// Drop any pending sign-in reply, e.g. when the user leaves the form.
    pub fn abandon_pending(&self) {
        self.gateway.abandon_pending();
    }

    /// End the session. Never fails; returns the path to show next.
    pub fn logout(&self) -> String {
        self.gateway.abandon_pending();
        self.store.clear();
        self.state.set_current_user(None);
        info!("Signed out");
        self.config.login_path.clone()
    }

    /// Run the guard. A denial ends whatever session is still announced.
    pub fn check_access(&self) -> GuardDecision {
        let decision = self.guard.check();
        match decision {
            GuardDecision::Redirect {
                reason: DenyReason::InvalidToken,
                ..
            } => {
                warn!("Stored token expired or malformed, ending session");
                self.store.clear();
                self.state.set_current_user(None);
            }
            GuardDecision::Redirect {
                reason: DenyReason::NoSession,
                ..
            } if self.state.current().is_some() => {
                warn!("Stored session is gone, signing out");
                self.state.set_current_user(None);
            }
            _ => {}
        }
        decision
    }

    /// Resolve `path` and apply the guard for protected routes.
    pub fn navigate(&self, path: &str) -> Navigation {
        let is_login = self.guard.is_login_route(path);
        let route = match routes::resolve(path) {
            Some(route) => route,
            None if is_login => routes::login_route(),
            None => {
                debug!(path, "No route");
                return Navigation::NotFound(path.to_string());
            }
        };

        if route.protected {
            return match self.check_access() {
                GuardDecision::Proceed => Navigation::Rendered(route),
                GuardDecision::Redirect { to, .. } => Navigation::Redirected {
                    from: path.to_string(),
                    to,
                },
            };
        }

        if is_login && self.is_authenticated() {
            return Navigation::Redirected {
                from: path.to_string(),
                to: self.config.home_path.clone(),
            };
        }

        Navigation::Rendered(route)
    }
}
