//! Domain service for accounts and credential recovery.
//!
//! Handles registration, login, and the single-use password reset flow.

use thiserror::Error;

use crate::db::User;

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username or email already taken")]
    Taken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid or expired token")]
    TokenInvalidOrExpired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for accounts.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an account with the default role.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Taken`] when the username or email is in use.
    async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<User, AuthError>;

    /// Verifies credentials and returns the account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails.
    async fn login(&self, username: &str, password: &str) -> Result<User, AuthError>;

    /// Starts the recovery flow. Succeeds whether or not the username
    /// exists, so callers cannot probe for accounts.
    async fn request_password_reset(&self, username: &str) -> Result<(), AuthError>;

    /// Redeems a reset token and rotates the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalidOrExpired`] for absent, expired,
    /// used, or concurrently redeemed tokens.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;
}
