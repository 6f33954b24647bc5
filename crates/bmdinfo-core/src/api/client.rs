//! Credential exchange with the BMDInfo auth server.
//!
//! `AuthBackend` is the request/response seam: `HttpAuthBackend` talks to the
//! real server, tests plug in scripted fakes. `AuthGateway` wraps a backend
//! and commits successful replies to the session store and the auth state
//! before handing them back to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::auth::{AuthStateBroadcaster, Environment, SessionStore};
use crate::config::Config;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError>;
}

/// HTTP backend for `POST {base}/login` and `POST {base}/register`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
}

impl HttpAuthBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status, &body))
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let url = self.endpoint(path);
        let response = self.client.post(&url).json(body).send().await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            AuthError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError> {
        self.post("login", request).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        self.post("register", request).await
    }
}

/// Issues login/register calls and commits the resulting session.
///
/// Each call takes a generation number. A reply is only applied if no newer
/// call, logout, or `abandon_pending` happened while it was in flight.
#[derive(Clone)]
pub struct AuthGateway {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    state: AuthStateBroadcaster,
    generation: Arc<AtomicU64>,
}

impl AuthGateway {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: SessionStore,
        state: AuthStateBroadcaster,
    ) -> Self {
        Self {
            backend,
            store,
            state,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AuthError> {
        let generation = self.begin();
        debug!(username = %request.username, generation, "Sending login request");

        let response = self.backend.login(request).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            e
        })?;
        self.commit(generation, response)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        let generation = self.begin();
        debug!(username = %request.username, generation, "Sending register request");

        let response = self.backend.register(request).await.map_err(|e| {
            warn!(error = %e, "Registration failed");
            e
        })?;
        self.commit(generation, response)
    }

    /// Make every in-flight login/register reply stale.
    pub fn abandon_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn commit(&self, generation: u64, response: AuthResponse) -> Result<AuthResponse, AuthError> {
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(generation, "Discarding stale auth response");
            return Err(AuthError::Superseded);
        }
        response.validate()?;

        if self.store.environment() == Environment::NonInteractive {
            debug!("Non-interactive environment, session not recorded");
            return Ok(response);
        }

        let user = response.user();
        self.store.save(&response.token, &user)?;
        self.state.set_current_user(Some(user));
        info!(user_id = %response.id, "Signed in");
        Ok(response)
    }
}
