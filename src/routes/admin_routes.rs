use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

/// Every account plus per-role counts for the admin console.
pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = state.user_service.list_users().await?;
    let hr_count = state.user_service.count_by_role(Role::Hr).await?;
    let manager_count = state.user_service.count_by_role(Role::Manager).await?;
    Ok(Json(json!({
        "success": true,
        "users": users,
        "hr_count": hr_count,
        "manager_count": manager_count,
    })))
}

/// Soft delete: the row stays for audit, the account can no longer sign in.
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let target = state
        .user_service
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound("User not found".into()))?;
    if target.email == claims.email {
        return Err(Error::Validation(
            "You cannot deactivate your own account".into(),
        ));
    }

    state.user_service.deactivate(id).await?;
    state
        .activity_service
        .log(
            &claims.email,
            "user_deactivated",
            Some(id),
            Some(format!("Deactivated {}", target.email)),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("{} deactivated", target.email),
    })))
}
