use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCandidatePayload {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub phone: String,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub education: Option<String>,
    #[serde(default)]
    pub experience: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCandidatePayload {
    #[validate(length(min = 1))]
    pub first_name: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub education: Option<String>,
    pub experience: Option<i32>,
}

/// Free-text substring over name/email/reference plus an exact status match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateFilters {
    pub q: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignCandidatePayload {
    pub candidate_id: uuid::Uuid,
    pub manager_email: String,
    /// RFC 3339 local time with offset.
    pub interview_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPayload {
    pub hr_rating: Option<i32>,
    pub hr_review: Option<String>,
    pub tech_rating: Option<i32>,
    pub tech_review: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectCandidatePayload {
    pub candidate_id: uuid::Uuid,
    pub reason: String,
}
