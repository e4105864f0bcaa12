use crate::error::{Error, Result};
use crate::models::reset_token::PasswordResetToken;
use crate::models::user::User;
use crate::utils::{crypto, token};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const TOKEN_LENGTH: usize = 43;
const TOKEN_TTL_MINUTES: i64 = 60;
const REAP_GRACE_HOURS: i64 = 24;

/// Issues, validates and retires single-use password-reset tokens.
#[derive(Clone)]
pub struct TokenService {
    pool: PgPool,
}

impl TokenService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a fresh token. Repeat requests are allowed; only the newest
    /// honorable token per user can be consumed (see `consume`).
    pub async fn issue(&self, user: &User) -> Result<PasswordResetToken> {
        self.reap().await?;

        let value = token::generate_token(TOKEN_LENGTH);
        let expires_at = Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES);
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, is_used, created_at
            "#,
        )
        .bind(user.id)
        .bind(&value)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Returns the token row only when it is still honorable: matching value,
    /// unused, unexpired. Used by the GET form renderer.
    pub async fn peek(&self, value: &str) -> Result<PasswordResetToken> {
        sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, is_used, created_at
            FROM password_reset_tokens
            WHERE token = $1 AND is_used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::InvalidOrUsedToken)
    }

    /// Single atomic consume: the token must match, be unused, unexpired AND
    /// be the newest unexpired token for its user (most-recent-wins; a
    /// superseded link stays dead even after the newest one is spent). Zero
    /// rows matched collapses invalid/used/expired/stale into one error so a
    /// caller cannot probe which it was. The token flip and the password
    /// update commit or roll back together.
    pub async fn consume(&self, value: &str, new_password: &str) -> Result<Uuid> {
        crypto::check_password_strength(new_password)
            .map_err(|msg| Error::Validation(msg.to_string()))?;

        self.reap().await?;

        let password_hash = crypto::hash_password(new_password)
            .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE password_reset_tokens t
            SET is_used = TRUE
            WHERE t.token = $1 AND t.is_used = FALSE AND t.expires_at > NOW()
              AND NOT EXISTS (
                  SELECT 1 FROM password_reset_tokens newer
                  WHERE newer.user_id = t.user_id
                    AND newer.expires_at > NOW()
                    AND newer.created_at > t.created_at
              )
            RETURNING t.user_id
            "#,
        )
        .bind(value)
        .fetch_optional(&mut *tx)
        .await?;

        let (user_id,) = row.ok_or(Error::InvalidOrUsedToken)?;

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(user_id)
    }

    /// Opportunistic cleanup of long-expired tokens.
    async fn reap(&self) -> Result<()> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < NOW() - $1::interval")
            .bind(format!("{} hours", REAP_GRACE_HOURS))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
