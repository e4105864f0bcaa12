use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use serde_json::json;

use crate::dto::auth_dto::{
    ForgotPasswordPayload, InvitePayload, LoginPayload, RegisterPayload, RegisterQuery,
    ResetPasswordPayload, ResetPasswordQuery, SessionUser,
};
use crate::error::{Error, Result};
use crate::middleware::auth;
use crate::models::user::Role;
use crate::utils::validation::validate;
use crate::AppState;

/// Landing page data: active user counts per role.
pub async fn landing(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let hr_count = state.user_service.count_by_role(Role::Hr).await?;
    let manager_count = state.user_service.count_by_role(Role::Manager).await?;
    let admin_count = state.user_service.count_by_role(Role::Admin).await?;
    Ok(Json(json!({
        "success": true,
        "hr_count": hr_count,
        "manager_count": manager_count,
        "admin_count": admin_count,
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;
    let user = state
        .user_service
        .login(&payload.email, &payload.password)
        .await?;
    let token = auth::issue_session(&user)?;

    let body = Json(json!({
        "success": true,
        "token": token,
        "user": SessionUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        },
    }));
    Ok((
        [(header::SET_COOKIE, auth::session_cookie(&token))],
        body,
    ))
}

pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, auth::clear_session_cookie())],
        Json(json!({"success": true})),
    )
}

/// Pre-fills the registration form from a valid invitation token.
pub async fn register_info(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
) -> Result<impl IntoResponse> {
    let (email, role) = state.user_service.verify_invite_token(&query.token)?;
    Ok(Json(json!({
        "success": true,
        "email": email,
        "role": role.as_str(),
    })))
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;
    let user = state
        .user_service
        .register_from_invite(&payload.token, &payload.name, &payload.password)
        .await?;
    state
        .activity_service
        .log(
            &user.email,
            "user_registered",
            Some(user.id),
            Some(format!("New user registered with role: {}", user.role)),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Registration successful! Please login.",
    })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordPayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;

    // Never reveal whether the email exists.
    let Some(user) = state.user_service.find_by_email(&payload.email).await? else {
        return Ok(Json(json!({
            "success": true,
            "message": "If the email exists, a reset link has been sent",
        })));
    };

    let token = state.token_service.issue(&user).await?;
    let config = crate::config::get_config();
    let reset_url = format!("{}/reset-password?token={}", config.base_url, token.token);
    state.mail_service.send_password_reset(&user.email, &reset_url);
    state
        .activity_service
        .log(
            &user.email,
            "password_reset_requested",
            Some(user.id),
            Some("Password reset link sent via email".to_string()),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "If the email exists, a reset link has been sent",
    })))
}

/// The form renderer: invalid tokens bounce back to the request page instead
/// of disclosing why they failed.
pub async fn reset_password_form(
    State(state): State<AppState>,
    Query(query): Query<ResetPasswordQuery>,
) -> Result<axum::response::Response> {
    let Some(token) = query.token else {
        return Ok(Redirect::to("/forgot-password").into_response());
    };
    match state.token_service.peek(&token).await {
        Ok(_) => Ok(Json(json!({"success": true, "token": token})).into_response()),
        Err(Error::InvalidOrUsedToken) => Ok(Redirect::to("/forgot-password").into_response()),
        Err(e) => Err(e),
    }
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;
    if payload.new_password != payload.confirm_password {
        return Err(Error::Validation("Passwords do not match".into()));
    }

    let user_id = state
        .token_service
        .consume(&payload.token, &payload.new_password)
        .await?;

    if let Some(user) = state.user_service.find_by_id(user_id).await? {
        state.mail_service.send_password_changed(&user.email, &user.name);
        state
            .activity_service
            .log(
                &user.email,
                "password_reset_completed",
                Some(user.id),
                Some("Password successfully changed via reset link".to_string()),
            )
            .await?;
    }

    Ok(Json(json!({
        "success": true,
        "message": "Password updated successfully",
    })))
}

/// Admin-only: emails a registration link binding email to role.
pub async fn invite(
    State(state): State<AppState>,
    Json(payload): Json<InvitePayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;
    let role = Role::parse(&payload.role)
        .filter(|r| matches!(r, Role::Hr | Role::Manager))
        .ok_or_else(|| Error::Validation("Role must be 'hr' or 'manager'".into()))?;

    if state
        .user_service
        .find_by_email(&payload.email)
        .await?
        .is_some()
    {
        return Err(Error::Validation("Email already registered".into()));
    }

    let token = state.user_service.issue_invite_token(&payload.email, role)?;
    let config = crate::config::get_config();
    let registration_url = format!("{}/register?token={}", config.base_url, token);
    state
        .mail_service
        .send_role_invitation(&payload.email, role, &registration_url);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": format!("Invitation sent to {}", payload.email),
        })),
    ))
}

/// True when the client is a fetch/XHR caller that wants JSON rather than a
/// redirect.
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false)
}
