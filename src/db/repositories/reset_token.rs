use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::entities::{password_reset_tokens, users};

/// Token lifetime, matching the window communicated in the reset email.
pub const TOKEN_TTL_SECS: i64 = 3600;

pub struct ResetTokenRepository {
    conn: DatabaseConnection,
}

impl ResetTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Mint a fresh single-use token for a user.
    pub async fn create(&self, user_id: i32) -> Result<password_reset_tokens::Model> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = (now + Duration::seconds(TOKEN_TTL_SECS)).to_rfc3339();

        let active = password_reset_tokens::ActiveModel {
            user_id: Set(user_id),
            token: Set(token),
            expires_at: Set(expires_at),
            used: Set(false),
            created_at: Set(now.to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert reset token")?;

        Ok(model)
    }

    /// Redeem a token and rotate the owner's credential in one transaction,
    /// returning the user id on success. Either both the used flip and the
    /// new hash land, or neither does.
    ///
    /// The used flag flips under an update filtered on `used = false`, so two
    /// concurrent redemptions of the same token cannot both succeed: the
    /// second sees zero rows affected and gets `None`.
    pub async fn redeem(&self, token: &str, new_password_hash: &str) -> Result<Option<i32>> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open transaction for token redemption")?;

        let row = password_reset_tokens::Entity::find()
            .filter(password_reset_tokens::Column::Token.eq(token))
            .one(&txn)
            .await
            .context("Failed to query reset token")?;

        let Some(row) = row else {
            txn.commit().await?;
            return Ok(None);
        };

        if row.used || is_expired(&row.expires_at) {
            txn.commit().await?;
            return Ok(None);
        }

        let consumed = password_reset_tokens::Entity::update_many()
            .col_expr(password_reset_tokens::Column::Used, Expr::value(true))
            .filter(password_reset_tokens::Column::Id.eq(row.id))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .exec(&txn)
            .await
            .context("Failed to mark reset token used")?;

        if consumed.rows_affected != 1 {
            txn.commit().await?;
            return Ok(None);
        }

        let rotated = users::Entity::update_many()
            .col_expr(
                users::Column::PasswordHash,
                Expr::value(new_password_hash),
            )
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(Utc::now().to_rfc3339()),
            )
            .filter(users::Column::Id.eq(row.user_id))
            .exec(&txn)
            .await
            .context("Failed to rotate password")?;

        // Token for a deleted account. The rollback keeps the row untouched,
        // which does not matter either way: it can never resolve to a user.
        if rotated.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(None);
        }

        txn.commit().await?;

        Ok(Some(row.user_id))
    }

    /// Drop tokens that can never be redeemed again.
    pub async fn prune(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = password_reset_tokens::Entity::delete_many()
            .filter(
                password_reset_tokens::Column::Used
                    .eq(true)
                    .or(password_reset_tokens::Column::ExpiresAt.lt(now)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to prune reset tokens")?;

        Ok(result.rows_affected)
    }
}

fn is_expired(expires_at: &str) -> bool {
    DateTime::parse_from_rfc3339(expires_at)
        .ok()
        .is_none_or(|ts| ts.with_timezone(&Utc) <= Utc::now())
}

/// Generate a random reset token (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
