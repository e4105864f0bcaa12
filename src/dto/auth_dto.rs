use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterPayload {
    pub token: String,
    #[serde(default)]
    pub name: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordPayload {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordPayload {
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvitePayload {
    #[validate(email)]
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: uuid::Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}
