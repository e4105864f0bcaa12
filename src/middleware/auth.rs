use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::user::{Role, User};

/// Session lifetime; the cookie is re-issued whenever less than half of it
/// remains.
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

pub fn issue_session(user: &User) -> crate::error::Result<String> {
    let config = crate::config::get_config();
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.clone(),
        exp: (chrono::Utc::now().timestamp() + SESSION_TTL_SECS) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| crate::error::Error::Internal(format!("Failed to sign session: {}", e)))
}

pub fn decode_session(token: &str) -> Option<Claims> {
    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .ok()
    .map(|data| data.claims)
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Pulls the session token from the Authorization header or the session
/// cookie.
pub fn extract_token(req: &Request) -> Option<String> {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    let cookies = req.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": "unauthenticated"})),
    )
        .into_response()
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"success": false, "error": "forbidden"})),
    )
        .into_response()
}

async fn guard(mut req: Request, next: Next, allowed: &[Role]) -> Response {
    let Some(token) = extract_token(&req) else {
        return unauthenticated();
    };
    let Some(claims) = decode_session(&token) else {
        return unauthenticated();
    };
    let Some(role) = claims.role() else {
        return forbidden();
    };
    if !allowed.is_empty() && !allowed.contains(&role) {
        return forbidden();
    }

    // Sliding renewal: refresh the cookie once the session is past its
    // half-life.
    let remaining = claims.exp as i64 - chrono::Utc::now().timestamp();
    let renew = remaining < SESSION_TTL_SECS / 2;
    let email = claims.email.clone();
    let role_str = claims.role.clone();
    let sub = claims.sub.clone();

    req.extensions_mut().insert(claims);
    let mut resp = next.run(req).await;

    if renew {
        let refreshed = Claims {
            sub,
            email,
            role: role_str,
            exp: (chrono::Utc::now().timestamp() + SESSION_TTL_SECS) as usize,
        };
        let config = crate::config::get_config();
        if let Ok(token) = encode(
            &Header::default(),
            &refreshed,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        ) {
            if let Ok(value) = HeaderValue::from_str(&session_cookie(&token)) {
                resp.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }
    resp
}

pub async fn require_admin(req: Request, next: Next) -> Response {
    guard(req, next, &[Role::Admin]).await
}

pub async fn require_hr(req: Request, next: Next) -> Response {
    guard(req, next, &[Role::Admin, Role::Hr]).await
}

pub async fn require_manager(req: Request, next: Next) -> Response {
    guard(req, next, &[Role::Admin, Role::Manager]).await
}
