use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    Extension, Form, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::candidate_dto::{
    AssignCandidatePayload, CandidateFilters, CreateCandidatePayload, RejectCandidatePayload,
    UpdateCandidatePayload,
};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::Role;
use crate::routes::auth_routes::is_ajax;
use crate::services::artifact_service::FileUpload;
use crate::utils::validation::validate;
use crate::AppState;

/// Candidate list plus the managers the assign form offers.
pub async fn dashboard(
    State(state): State<AppState>,
    Query(filters): Query<CandidateFilters>,
) -> Result<impl IntoResponse> {
    let candidates = state.candidate_service.list_for_hr(&filters).await?;
    let managers = state.user_service.list_active_by_role(Role::Manager).await?;
    let managers: Vec<_> = managers
        .into_iter()
        .map(|m| json!({"email": m.email, "name": m.name}))
        .collect();
    Ok(Json(json!({
        "success": true,
        "candidates": candidates,
        "managers": managers,
    })))
}

/// Intake form: text fields plus the `resume` and `image` file parts.
pub async fn create_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut first_name = String::new();
    let mut last_name = String::new();
    let mut email = String::new();
    let mut phone = String::new();
    let mut gender = None;
    let mut dob = None;
    let mut education = None;
    let mut experience = 0i32;
    let mut resume = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "first_name" => first_name = field.text().await?,
            "last_name" => last_name = field.text().await?,
            "email" => email = field.text().await?,
            "phone" => phone = field.text().await?,
            "gender" => gender = Some(field.text().await?),
            "education" => education = Some(field.text().await?),
            "dob" => {
                let raw = field.text().await?;
                if !raw.is_empty() {
                    dob = Some(
                        chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                            Error::Validation("dob must be formatted YYYY-MM-DD".into())
                        })?,
                    );
                }
            }
            "experience" => {
                let raw = field.text().await?;
                experience = raw.trim().parse::<i32>().map_err(|_| {
                    Error::Validation("experience must be a whole number of years".into())
                })?;
            }
            "resume" | "image" => {
                let upload = FileUpload {
                    filename: field.file_name().unwrap_or("file").to_string(),
                    content_type: field.content_type().unwrap_or_default().to_string(),
                    data: field.bytes().await?,
                };
                if field_name == "resume" {
                    resume = Some(upload);
                } else {
                    image = Some(upload);
                }
            }
            // Unknown fields are dropped.
            _ => {}
        }
    }

    let payload = CreateCandidatePayload {
        first_name,
        last_name,
        email,
        phone,
        gender,
        dob,
        education,
        experience,
    };
    validate(&payload)?;
    let resume = resume.ok_or_else(|| Error::Validation("Resume file is required".into()))?;
    let image = image.ok_or_else(|| Error::Validation("Photo file is required".into()))?;

    let candidate = state
        .candidate_service
        .create(payload, resume, image, &claims.email)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Candidate added successfully",
        "reference_id": candidate.reference_id,
    })))
}

/// Form post from the dashboard. XHR callers get the JSON envelope;
/// plain form posts are bounced back to the referring page.
pub async fn assign_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Form(payload): Form<AssignCandidatePayload>,
) -> Result<axum::response::Response> {
    let candidate = state
        .assignment_service
        .assign(
            payload.candidate_id,
            &payload.manager_email,
            &payload.interview_time,
            &claims.email,
        )
        .await?;

    if is_ajax(&headers) {
        Ok(Json(json!({
            "success": true,
            "message": "Candidate assigned successfully",
            "reference_id": candidate.reference_id,
        }))
        .into_response())
    } else {
        let back = headers
            .get(axum::http::header::REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("/hr/dashboard");
        Ok(Redirect::to(back).into_response())
    }
}

pub async fn reassign_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Form(payload): Form<AssignCandidatePayload>,
) -> Result<axum::response::Response> {
    let candidate = state
        .assignment_service
        .reassign(
            payload.candidate_id,
            &payload.manager_email,
            &payload.interview_time,
            &claims.email,
        )
        .await?;

    if is_ajax(&headers) {
        Ok(Json(json!({
            "success": true,
            "message": "Candidate reassigned successfully",
            "reference_id": candidate.reference_id,
        }))
        .into_response())
    } else {
        let back = headers
            .get(axum::http::header::REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("/hr/dashboard");
        Ok(Redirect::to(back).into_response())
    }
}

pub async fn reject_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RejectCandidatePayload>,
) -> Result<impl IntoResponse> {
    let role = claims
        .role()
        .ok_or_else(|| Error::Forbidden("Unknown role".into()))?;
    let candidate = state
        .assignment_service
        .reject(payload.candidate_id, &payload.reason, &claims.email, role)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Candidate rejected",
        "reference_id": candidate.reference_id,
    })))
}

pub async fn candidate_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let candidate = state.candidate_service.get(id).await?;
    let activity = state.activity_service.recent_for_entity(id, 20).await?;
    Ok(Json(json!({
        "success": true,
        "candidate": candidate,
        "activity": activity,
    })))
}

pub async fn update_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateCandidatePayload>,
) -> Result<impl IntoResponse> {
    validate(&patch)?;
    let candidate = state
        .candidate_service
        .update(id, patch, &claims.email)
        .await?;
    Ok(Json(json!({"success": true, "candidate": candidate})))
}

pub async fn delete_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.candidate_service.delete(id, &claims.email).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Candidate deleted",
    })))
}
