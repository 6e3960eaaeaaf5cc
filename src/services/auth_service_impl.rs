//! `SeaORM` implementation of the `AuthService` trait.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::constants::{PASSWORD_MIN_LEN, USERNAME_MAX_LEN, USERNAME_MIN_LEN};
use crate::db::{Store, User};
use crate::entities::users::Role;
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::notifier::Notifier;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|e| panic!("Invalid email regex: {e}"))
});

pub struct SeaOrmAuthService {
    store: Store,
    notifier: Arc<dyn Notifier>,
    public_base_url: String,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, public_base_url: String) -> Self {
        Self {
            store,
            notifier,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn audit(&self, actor_id: Option<i32>, action: &str, entity_id: i32, details: &str) {
        if let Err(e) = self
            .store
            .append_audit(actor_id, action, "user", entity_id, details)
            .await
        {
            warn!("Audit append failed for {action} on user {entity_id}: {e}");
        }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<User, AuthError> {
        validate_username(username)?;
        validate_password(password)?;
        if let Some(email) = email {
            validate_email(email)?;
        }

        // The unique constraints decide; a pre-check would only race.
        let user = self
            .store
            .create_user(username, email, password, Role::User)
            .await?
            .ok_or(AuthError::Taken)?;

        self.audit(Some(user.id), "register", user.id, &format!("username={username}"))
            .await;

        Ok(user)
    }

    async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        self.store
            .verify_user_password(username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn request_password_reset(&self, username: &str) -> Result<(), AuthError> {
        // Uniform outcome regardless of whether the account exists.
        let Some(user) = self.store.get_user_by_username(username).await? else {
            return Ok(());
        };

        let token = self.store.create_reset_token(user.id).await?;
        let link = format!(
            "{}/reset-password?token={}",
            self.public_base_url, token.token
        );

        match &user.email {
            Some(email) => {
                if let Err(e) = self.notifier.send_password_reset(email, &link).await {
                    warn!("Failed to deliver reset notification for user {}: {e}", user.id);
                }
            }
            None => {
                warn!("User {} has no email on file; reset link logged", user.id);
                tracing::info!("Reset link for {username}: {link}");
            }
        }

        self.audit(None, "password_reset_request", user.id, "").await;

        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;

        // The used flip and the credential rotation commit in one
        // transaction; the flip is a compare-and-swap on the used flag, so
        // of two racing redemptions exactly one gets the user id back.
        let user_id = self
            .store
            .redeem_reset_token(token, new_password)
            .await?
            .ok_or(AuthError::TokenInvalidOrExpired)?;

        self.audit(Some(user_id), "password_reset", user_id, "").await;

        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::Validation(
            "Username can only contain letters, digits, underscores, hyphens, and dots".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(AuthError::Validation(
            "Email address is not valid".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_shape() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d9").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"x".repeat(81)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("semi;colon").is_err());
    }

    #[test]
    fn password_minimum() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.domain.org").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
    }
}
