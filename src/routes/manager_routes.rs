use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::candidate_dto::{CandidateFilters, RejectPayload, ReviewPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::AppState;

/// Only candidates assigned to the signed-in manager. Admins see everything.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filters): Query<CandidateFilters>,
) -> Result<impl IntoResponse> {
    let candidates = if claims.role() == Some(Role::Admin) {
        state.candidate_service.list_for_hr(&filters).await?
    } else {
        state
            .candidate_service
            .list_for_manager(&claims.email, &filters)
            .await?
    };
    Ok(Json(json!({
        "success": true,
        "candidates": candidates,
    })))
}

pub async fn candidate_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let candidate = state.candidate_service.get(id).await?;
    if claims.role() == Some(Role::Manager)
        && candidate.assigned_to.as_deref() != Some(claims.email.as_str())
    {
        return Err(Error::Forbidden(
            "This candidate is assigned to another manager".into(),
        ));
    }
    Ok(Json(json!({
        "success": true,
        "candidate": candidate,
    })))
}

pub async fn review_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewPayload>,
) -> Result<impl IntoResponse> {
    let role = claims
        .role()
        .ok_or_else(|| Error::Forbidden("Unknown role".into()))?;
    let candidate = state
        .assignment_service
        .review(id, &payload, &claims.email, role)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Review submitted successfully",
        "reference_id": candidate.reference_id,
    })))
}

pub async fn reject_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> Result<impl IntoResponse> {
    let role = claims
        .role()
        .ok_or_else(|| Error::Forbidden("Unknown role".into()))?;
    let candidate = state
        .assignment_service
        .reject(id, &payload.reason, &claims.email, role)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Candidate rejected",
        "reference_id": candidate.reference_id,
    })))
}
