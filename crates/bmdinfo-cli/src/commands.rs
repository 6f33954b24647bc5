use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::error;

use bmdinfo_core::auth::token;
use bmdinfo_core::{AuthError, LoginRequest, Navigation, RegisterRequest, SessionManager};

/// Password source for scripted runs
const PASSWORD_ENV: &str = "BMDINFO_PASSWORD";

const LOGIN_FAILED: &str = "Invalid username or password";
const REGISTER_FAILED: &str = "Registration failed";

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn prompt_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

/// Turn a gateway failure into the message the browser client would alert.
fn report(err: AuthError, fallback: &str) -> anyhow::Error {
    error!(error = %err, "Request failed");
    let message = match err {
        AuthError::NetworkError(ref e) if e.is_timeout() => {
            "Connection timed out. Please try again.".to_string()
        }
        AuthError::NetworkError(ref e) if e.is_connect() => {
            "Unable to connect to server. Check your connection.".to_string()
        }
        AuthError::Superseded => "Request was cancelled before it completed.".to_string(),
        ref other => other.user_message(fallback),
    };
    anyhow::anyhow!(message)
}

pub async fn login(manager: &SessionManager, username: Option<&str>) -> Result<()> {
    let username = match username {
        Some(u) => u.to_string(),
        None => prompt_username()?,
    };
    let password = prompt_password()?;
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password required");
    }

    println!("Authenticating...");
    manager
        .login(&LoginRequest::new(username, password))
        .await
        .map_err(|e| report(e, LOGIN_FAILED))?;

    println!("Login Successful!");
    open(manager, &manager.config().home_path);
    Ok(())
}

pub async fn register(manager: &SessionManager, username: &str, email: &str) -> Result<()> {
    let password = prompt_password()?;
    if password.is_empty() {
        anyhow::bail!("Password required");
    }

    manager
        .register(&RegisterRequest::new(username, email, password))
        .await
        .map_err(|e| report(e, REGISTER_FAILED))?;

    open(manager, &manager.config().home_path);
    Ok(())
}

pub fn logout(manager: &SessionManager) {
    let next = manager.logout();
    println!("Signed out.");
    open(manager, &next);
}

pub fn whoami(manager: &SessionManager) {
    match manager.current_user() {
        Some(user) => {
            println!("{} <{}> ({}, id {})", user.username, user.email, user.role, user.id);
            match manager.token().and_then(|t| token::decode(&t).ok()) {
                Some(claims) => println!("Session expires in {} minutes", claims.minutes_until_expiry(Utc::now())),
                None => println!("Session token unreadable"),
            }
        }
        None => println!("Not signed in."),
    }
}

pub fn open(manager: &SessionManager, path: &str) {
    match manager.navigate(path) {
        Navigation::Rendered(route) => println!("[{}] {}", route.title, path),
        Navigation::Redirected { from, to } => {
            println!("{} -> redirected to {}", from, to);
            if let Navigation::Rendered(route) = manager.navigate(&to) {
                println!("[{}] {}", route.title, to);
            }
        }
        Navigation::NotFound(path) => println!("No page at {}", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_prefers_server_message() {
        let err = AuthError::Unauthorized {
            message: Some("Account locked".to_string()),
        };
        assert_eq!(report(err, LOGIN_FAILED).to_string(), "Account locked");
    }

    #[test]
    fn test_report_falls_back_to_generic_message() {
        let err = AuthError::Rejected { status: 400, message: None };
        assert_eq!(report(err, REGISTER_FAILED).to_string(), "Registration failed");
    }

    #[test]
    fn test_report_discarded_reply_is_not_a_credential_failure() {
        assert_eq!(
            report(AuthError::Superseded, LOGIN_FAILED).to_string(),
            "Request was cancelled before it completed."
        );
    }
}
