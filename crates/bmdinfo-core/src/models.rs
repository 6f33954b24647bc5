//! Wire and session models shared with the BMDInfo auth server.
//!
//! - `User`: the authenticated principal, also persisted under `current_user`
//! - `AuthResponse`: flat reply from `/login` and `/register`
//! - `LoginRequest`, `RegisterRequest`: request bodies

use serde::{Deserialize, Serialize};

use crate::api::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl AuthResponse {
    /// The user record carried by this response.
    pub fn user(&self) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }

    /// Reject replies that would leave a token without a user or vice versa.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.token.trim().is_empty() {
            return Err(AuthError::InvalidResponse("missing token".to_string()));
        }
        if self.id.is_empty() || self.username.is_empty() {
            return Err(AuthError::InvalidResponse("missing user fields".to_string()));
        }
        Ok(())
    }
}
