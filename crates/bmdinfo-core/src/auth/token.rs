//! Bearer token claim decoding and expiry checks.
//!
//! Tokens are not verified here; the backend owns signatures. The client
//! only reads the payload to decide whether a stored token is still worth
//! presenting. Every failure path answers "invalid".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Number of dot-separated segments in a well-formed token
const TOKEN_SEGMENTS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token has {0} segments, expected 3")]
    SegmentCount(usize),

    #[error("Token payload is not valid base64url")]
    Base64,

    #[error("Token payload is not valid claims JSON: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Expiry, epoch seconds
    pub exp: i64,

    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.exp.saturating_mul(1000)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        let millis = self.exp.saturating_mul(1000).saturating_sub(now.timestamp_millis());
        // Duration spans -i64::MAX..=i64::MAX milliseconds
        Duration::milliseconds(millis.max(-i64::MAX))
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// Decode the claims segment of `token`.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| DecodeError::Base64)?;

    serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))
}

/// Whether `token` decodes and has not expired as of now.
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, Utc::now())
}

pub fn is_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode(token) {
        Ok(claims) => !claims.is_expired_at(now),
        Err(_) => false,
    }
}
