use crate::dto::candidate_dto::ReviewPayload;
use crate::error::{Error, Result};
use crate::models::candidate::{Candidate, CandidateStatus};
use crate::models::user::Role;
use crate::services::activity_service::ActivityService;
use crate::services::mail_service::MailService;
use crate::utils::time;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const RETURNING: &str = r#"
    RETURNING id, reference_id, first_name, last_name, email, phone, gender, dob,
              education, experience, resume_path, image_path,
              hr_rating, hr_review, tech_rating, tech_review,
              status, assigned_by, assigned_to, interview_time, reject_reason,
              created_at, updated_at
"#;

/// The single authoritative mutator of `status`, `assigned_to`,
/// `interview_time` and the rating fields. Per-candidate updates are
/// serialized by a compare-and-set on `updated_at`; the loser of a race sees
/// `stale_state`.
#[derive(Clone)]
pub struct AssignmentService {
    pool: PgPool,
    mailer: MailService,
    activity: ActivityService,
}

impl AssignmentService {
    pub fn new(pool: PgPool, mailer: MailService, activity: ActivityService) -> Self {
        Self {
            pool,
            mailer,
            activity,
        }
    }

    /// `new → assigned`. Persists manager + interview time and enqueues the
    /// assignment email.
    pub async fn assign(
        &self,
        candidate_id: Uuid,
        manager_email: &str,
        interview_time: &str,
        actor_email: &str,
    ) -> Result<Candidate> {
        let manager_email = parse_manager_email(manager_email)?;
        let interview_time = parse_future_time(interview_time)?;

        let current = self.load(candidate_id).await?;
        if current.status() != Some(CandidateStatus::New) {
            return Err(Error::Validation(format!(
                "Candidate is already {}; use reassign",
                current.status
            )));
        }

        let candidate = self
            .cas_update(
                &format!(
                    r#"
                    UPDATE candidates
                    SET status = 'assigned', assigned_to = $1, interview_time = $2,
                        assigned_by = $3, updated_at = NOW()
                    WHERE id = $4 AND updated_at = $5
                    {}
                    "#,
                    RETURNING
                ),
                &manager_email,
                interview_time,
                actor_email,
                candidate_id,
                current.updated_at,
            )
            .await?;

        self.mailer
            .send_candidate_assignment(&manager_email, &candidate);
        self.activity
            .log(
                actor_email,
                "candidate_assigned",
                Some(candidate_id),
                Some(format!("Assigned to {}", manager_email)),
            )
            .await?;
        Ok(candidate)
    }

    /// `any → assigned`. Same preconditions as assign but permitted from any
    /// state, including `rejected`; clears any earlier rejection note.
    pub async fn reassign(
        &self,
        candidate_id: Uuid,
        manager_email: &str,
        interview_time: &str,
        actor_email: &str,
    ) -> Result<Candidate> {
        let manager_email = parse_manager_email(manager_email)?;
        let interview_time = parse_future_time(interview_time)?;

        let current = self.load(candidate_id).await?;
        let candidate = self
            .cas_update(
                &format!(
                    r#"
                    UPDATE candidates
                    SET status = 'assigned', assigned_to = $1, interview_time = $2,
                        assigned_by = $3, reject_reason = NULL, updated_at = NOW()
                    WHERE id = $4 AND updated_at = $5
                    {}
                    "#,
                    RETURNING
                ),
                &manager_email,
                interview_time,
                actor_email,
                candidate_id,
                current.updated_at,
            )
            .await?;

        self.mailer
            .send_candidate_assignment(&manager_email, &candidate);
        self.activity
            .log(
                actor_email,
                "candidate_reassigned",
                Some(candidate_id),
                Some(format!("Reassigned to {}", manager_email)),
            )
            .await?;
        Ok(candidate)
    }

    /// `assigned → reviewed` by the owning manager. Accepts either rating
    /// pair alone or both atomically; an empty review is rejected.
    pub async fn review(
        &self,
        candidate_id: Uuid,
        payload: &ReviewPayload,
        actor_email: &str,
        actor_role: Role,
    ) -> Result<Candidate> {
        validate_review(payload)?;

        let current = self.load(candidate_id).await?;
        check_ownership(&current, actor_email, actor_role)?;
        if current.status() != Some(CandidateStatus::Assigned) {
            return Err(Error::Validation(format!(
                "Candidate must be assigned before review (currently {})",
                current.status
            )));
        }

        let candidate = sqlx::query_as::<_, Candidate>(&format!(
            r#"
            UPDATE candidates
            SET status = 'reviewed',
                hr_rating = COALESCE($1, hr_rating),
                hr_review = COALESCE($2, hr_review),
                tech_rating = COALESCE($3, tech_rating),
                tech_review = COALESCE($4, tech_review),
                updated_at = NOW()
            WHERE id = $5 AND updated_at = $6
            {}
            "#,
            RETURNING
        ))
        .bind(payload.hr_rating)
        .bind(payload.hr_review.as_deref().map(str::trim))
        .bind(payload.tech_rating)
        .bind(payload.tech_review.as_deref().map(str::trim))
        .bind(candidate_id)
        .bind(current.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::StaleState)?;

        self.activity
            .log(actor_email, "candidate_reviewed", Some(candidate_id), None)
            .await?;
        Ok(candidate)
    }

    /// `new|assigned → rejected` by HR or the owning manager.
    pub async fn reject(
        &self,
        candidate_id: Uuid,
        reason: &str,
        actor_email: &str,
        actor_role: Role,
    ) -> Result<Candidate> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation("A rejection reason is required".into()));
        }

        let current = self.load(candidate_id).await?;
        if actor_role == Role::Manager {
            check_ownership(&current, actor_email, actor_role)?;
        }
        if !matches!(
            current.status(),
            Some(CandidateStatus::New) | Some(CandidateStatus::Assigned)
        ) {
            return Err(Error::Validation(format!(
                "Cannot reject a {} candidate",
                current.status
            )));
        }

        let candidate = sqlx::query_as::<_, Candidate>(&format!(
            r#"
            UPDATE candidates
            SET status = 'rejected', reject_reason = $1, updated_at = NOW()
            WHERE id = $2 AND updated_at = $3
            {}
            "#,
            RETURNING
        ))
        .bind(reason)
        .bind(candidate_id)
        .bind(current.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::StaleState)?;

        self.activity
            .log(
                actor_email,
                "candidate_rejected",
                Some(candidate_id),
                Some(reason.to_string()),
            )
            .await?;
        Ok(candidate)
    }

    async fn load(&self, candidate_id: Uuid) -> Result<Candidate> {
        sqlx::query_as::<_, Candidate>(
            r#"
            SELECT id, reference_id, first_name, last_name, email, phone, gender, dob,
                   education, experience, resume_path, image_path,
                   hr_rating, hr_review, tech_rating, tech_review,
                   status, assigned_by, assigned_to, interview_time, reject_reason,
                   created_at, updated_at
            FROM candidates WHERE id = $1
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Candidate not found".into()))
    }

    async fn cas_update(
        &self,
        sql: &str,
        manager_email: &str,
        interview_time: DateTime<Utc>,
        actor_email: &str,
        candidate_id: Uuid,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Candidate> {
        sqlx::query_as::<_, Candidate>(sql)
            .bind(manager_email)
            .bind(interview_time)
            .bind(actor_email)
            .bind(candidate_id)
            .bind(expected_updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::StaleState)
    }
}

fn parse_manager_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if !validator::ValidateEmail::validate_email(&email) {
        return Err(Error::Validation(format!(
            "'{}' is not a valid manager email",
            raw
        )));
    }
    Ok(email)
}

fn parse_future_time(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = time::from_rfc3339(raw.trim())
        .map_err(|_| Error::Validation("interview_time must be an RFC 3339 timestamp".into()))?;
    if parsed <= time::now() {
        return Err(Error::Validation(
            "Interview time must be in the future".into(),
        ));
    }
    Ok(parsed)
}

/// At least one rating must be present, each rating in 1..=5 with a non-empty
/// paired review, and a review text is meaningless without its rating.
fn validate_review(payload: &ReviewPayload) -> Result<()> {
    let pairs = [
        ("hr", payload.hr_rating, payload.hr_review.as_deref()),
        ("tech", payload.tech_rating, payload.tech_review.as_deref()),
    ];

    let mut any_complete = false;
    for (round, rating, review) in pairs {
        match (rating, review.map(str::trim)) {
            (None, None) | (None, Some("")) => {}
            (Some(r), Some(text)) if !text.is_empty() => {
                if !(1..=5).contains(&r) {
                    return Err(Error::Validation(format!(
                        "{} rating must be between 1 and 5",
                        round
                    )));
                }
                any_complete = true;
            }
            _ => {
                return Err(Error::Validation(format!(
                    "{} rating and review must be submitted together",
                    round
                )));
            }
        }
    }

    if !any_complete {
        return Err(Error::Validation(
            "At least one rating/review pair is required".into(),
        ));
    }
    Ok(())
}

fn check_ownership(candidate: &Candidate, actor_email: &str, actor_role: Role) -> Result<()> {
    if actor_role == Role::Admin {
        return Ok(());
    }
    if candidate.assigned_to.as_deref() != Some(actor_email) {
        return Err(Error::Forbidden(
            "Candidate is not assigned to you".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(
        hr_rating: Option<i32>,
        hr_review: Option<&str>,
        tech_rating: Option<i32>,
        tech_review: Option<&str>,
    ) -> ReviewPayload {
        ReviewPayload {
            hr_rating,
            hr_review: hr_review.map(String::from),
            tech_rating,
            tech_review: tech_review.map(String::from),
        }
    }

    #[test]
    fn empty_review_is_rejected() {
        assert!(validate_review(&review(None, None, None, None)).is_err());
    }

    #[test]
    fn single_pair_is_accepted() {
        assert!(validate_review(&review(Some(4), Some("good fit"), None, None)).is_ok());
        assert!(validate_review(&review(None, None, Some(5), Some("strong"))).is_ok());
    }

    #[test]
    fn both_pairs_are_accepted_atomically() {
        assert!(validate_review(&review(Some(4), Some("good fit"), Some(5), Some("strong"))).is_ok());
    }

    #[test]
    fn rating_without_review_is_rejected() {
        assert!(validate_review(&review(Some(4), None, None, None)).is_err());
        assert!(validate_review(&review(Some(4), Some("   "), None, None)).is_err());
        assert!(validate_review(&review(None, Some("text"), None, None)).is_err());
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        assert!(validate_review(&review(Some(0), Some("x"), None, None)).is_err());
        assert!(validate_review(&review(Some(6), Some("x"), None, None)).is_err());
    }

    #[test]
    fn manager_email_is_validated_and_lowercased() {
        assert_eq!(parse_manager_email(" Mgr@Ex.com ").unwrap(), "mgr@ex.com");
        assert!(parse_manager_email("not-an-email").is_err());
    }

    #[test]
    fn interview_time_must_be_in_the_future() {
        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        assert!(parse_future_time(&past).is_err());
        let now = Utc::now().to_rfc3339();
        assert!(parse_future_time(&now).is_err());
        let soon = (Utc::now() + chrono::Duration::seconds(2)).to_rfc3339();
        assert!(parse_future_time(&soon).is_ok());
    }
}
