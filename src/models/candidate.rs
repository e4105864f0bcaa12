use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    New,
    Assigned,
    Reviewed,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::New => "new",
            CandidateStatus::Assigned => "assigned",
            CandidateStatus::Reviewed => "reviewed",
            CandidateStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<CandidateStatus> {
        match s {
            "new" => Some(CandidateStatus::New),
            "assigned" => Some(CandidateStatus::Assigned),
            "reviewed" => Some(CandidateStatus::Reviewed),
            "rejected" => Some(CandidateStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Candidate {
    pub id: Uuid,
    pub reference_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub education: Option<String>,
    pub experience: i32,
    pub resume_path: Option<String>,
    pub image_path: Option<String>,
    pub hr_rating: Option<i32>,
    pub hr_review: Option<String>,
    pub tech_rating: Option<i32>,
    pub tech_review: Option<String>,
    pub status: String,
    pub assigned_by: Option<String>,
    pub assigned_to: Option<String>,
    pub interview_time: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn status(&self) -> Option<CandidateStatus> {
        CandidateStatus::parse(&self.status)
    }
}
