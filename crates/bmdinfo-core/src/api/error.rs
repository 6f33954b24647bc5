use serde::Deserialize;
use thiserror::Error;

use crate::auth::StorageError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unauthorized: {}", .message.as_deref().unwrap_or("credentials rejected"))]
    Unauthorized { message: Option<String> },

    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    #[error("Server error ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    ServerError {
        status: u16,
        message: Option<String>,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to record session: {0}")]
    Storage(#[from] StorageError),

    #[error("Response discarded - a newer request or logout superseded it")]
    Superseded,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a `message` field out of a JSON error body, if the server sent one.
    fn server_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .map(|m| Self::truncate_body(&m))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::server_message(body);
        match status.as_u16() {
            401 => AuthError::Unauthorized { message },
            500..=599 => AuthError::ServerError {
                status: status.as_u16(),
                message,
            },
            code => AuthError::Rejected {
                status: code,
                message,
            },
        }
    }

    /// The server-supplied message, when the backend provided one.
    pub fn server_supplied_message(&self) -> Option<&str> {
        match self {
            AuthError::Unauthorized { message }
            | AuthError::Rejected { message, .. }
            | AuthError::ServerError { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Message for display: the server's own words, or the caller's generic fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_supplied_message()
            .unwrap_or(fallback)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_extracts_server_message() {
        let err = AuthError::from_status(StatusCode::BAD_REQUEST, r#"{"message":"Username already taken"}"#);
        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));
        assert_eq!(err.user_message("Registration failed"), "Username already taken");
    }

    #[test]
    fn test_from_status_falls_back_without_message() {
        let err = AuthError::from_status(StatusCode::UNAUTHORIZED, "<html>nope</html>");
        assert!(matches!(err, AuthError::Unauthorized { message: None }));
        assert_eq!(err.user_message("Invalid username or password"), "Invalid username or password");
    }

    #[test]
    fn test_from_status_blank_message_is_ignored() {
        let err = AuthError::from_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"  "}"#);
        assert!(matches!(err, AuthError::ServerError { status: 500, message: None }));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = AuthError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));
        assert_eq!(AuthError::truncate_body("short"), "short");
    }

    #[test]
    fn test_superseded_has_no_server_message() {
        assert_eq!(AuthError::Superseded.user_message("Registration failed"), "Registration failed");
    }
}
