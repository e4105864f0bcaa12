use crate::error::Result;
use crate::models::activity_log::ActivityLog;
use sqlx::PgPool;
use uuid::Uuid;

/// Append-only audit trail of who did what.
#[derive(Clone)]
pub struct ActivityService {
    pool: PgPool,
}

impl ActivityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(
        &self,
        user_email: &str,
        action: &str,
        entity_id: Option<Uuid>,
        details: Option<String>,
    ) -> Result<ActivityLog> {
        let row = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_log (user_email, action, entity_id, details)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_email, action, entity_id, details, created_at
            "#,
        )
        .bind(user_email)
        .bind(action)
        .bind(entity_id)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn recent_for_entity(&self, entity_id: Uuid, limit: i64) -> Result<Vec<ActivityLog>> {
        let rows = sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT id, user_email, action, entity_id, details, created_at
            FROM activity_log WHERE entity_id = $1
            ORDER BY created_at DESC LIMIT $2
            "#,
        )
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
