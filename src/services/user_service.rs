use crate::error::{Error, Result};
use crate::models::user::{Role, User};
use crate::utils::crypto;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const SELECT_USER: &str =
    "SELECT id, email, name, password_hash, role, is_active, created_at, updated_at FROM users";

/// Invitation links carry a signed JWT so the register form can be public.
const INVITE_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteClaims {
    pub email: String,
    pub role: String,
    pub typ: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE email = $1", SELECT_USER))
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE id = $1", SELECT_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or(Error::InvalidCredentials)?;
        let ok = crypto::verify_password(password, &user.password_hash)
            .map_err(|e| Error::Internal(format!("Password verification failed: {}", e)))?;
        if !ok {
            return Err(Error::InvalidCredentials);
        }
        if !user.is_active {
            return Err(Error::InactiveAccount);
        }
        Ok(user)
    }

    pub fn issue_invite_token(&self, email: &str, role: Role) -> Result<String> {
        let config = crate::config::get_config();
        let claims = InviteClaims {
            email: email.to_lowercase(),
            role: role.as_str().to_string(),
            typ: "invitation".to_string(),
            exp: (chrono::Utc::now().timestamp() + INVITE_TTL_SECS) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign invite: {}", e)))
    }

    pub fn verify_invite_token(&self, token: &str) -> Result<(String, Role)> {
        let config = crate::config::get_config();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<InviteClaims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::Validation("Invalid or expired invitation token".into()))?;
        if data.claims.typ != "invitation" {
            return Err(Error::Validation("Invalid invitation token".into()));
        }
        let role = Role::parse(&data.claims.role)
            .ok_or_else(|| Error::Validation("Invitation carries an unknown role".into()))?;
        Ok((data.claims.email, role))
    }

    /// Completes an admin invitation: the token pins both email and role.
    pub async fn register_from_invite(
        &self,
        token: &str,
        name: &str,
        password: &str,
    ) -> Result<User> {
        let (email, role) = self.verify_invite_token(token)?;
        if self.find_by_email(&email).await?.is_some() {
            return Err(Error::Validation("Email already registered".into()));
        }
        crypto::check_password_strength(password)
            .map_err(|msg| Error::Validation(msg.to_string()))?;
        let name = if name.trim().is_empty() {
            email.split('@').next().unwrap_or("user").to_string()
        } else {
            name.trim().to_string()
        };
        self.create_user(&email, &name, password, role).await
    }

    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let password_hash = crypto::hash_password(password)
            .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, password_hash, role, is_active, created_at, updated_at
            "#,
        )
        .bind(email.to_lowercase())
        .bind(name)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Keeps the row for audit; only flips the flag.
    pub async fn deactivate(&self, user_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".into()));
        }
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!("{} ORDER BY created_at DESC", SELECT_USER))
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn list_active_by_role(&self, role: Role) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "{} WHERE role = $1 AND is_active ORDER BY name",
            SELECT_USER
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn count_by_role(&self, role: Role) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1 AND is_active")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Makes sure the configured admin account exists at startup.
    pub async fn ensure_default_admin(&self) -> Result<()> {
        let config = crate::config::get_config();
        if self
            .find_by_email(&config.default_admin_email)
            .await?
            .is_some()
        {
            return Ok(());
        }
        self.create_user(
            &config.default_admin_email,
            &config.default_admin_name,
            &config.default_admin_password,
            Role::Admin,
        )
        .await?;
        tracing::info!("Default admin user created: {}", config.default_admin_email);
        Ok(())
    }
}
