use crate::dto::candidate_dto::{CandidateFilters, CreateCandidatePayload, UpdateCandidatePayload};
use crate::error::{Error, Result};
use crate::models::candidate::Candidate;
use crate::services::activity_service::ActivityService;
use crate::services::artifact_service::{normalize, ArtifactKind, ArtifactService, FileUpload};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const SELECT_CANDIDATE: &str = r#"
    SELECT id, reference_id, first_name, last_name, email, phone, gender, dob,
           education, experience, resume_path, image_path,
           hr_rating, hr_review, tech_rating, tech_review,
           status, assigned_by, assigned_to, interview_time, reject_reason,
           created_at, updated_at
    FROM candidates
"#;

#[derive(Clone)]
pub struct CandidateService {
    pool: PgPool,
    artifacts: ArtifactService,
    activity: ActivityService,
}

impl CandidateService {
    pub fn new(pool: PgPool, artifacts: ArtifactService, activity: ActivityService) -> Self {
        Self {
            pool,
            artifacts,
            activity,
        }
    }

    /// Intake: persists both artifacts, inserts the document with
    /// `status=new` and an immutable reference id, and writes an audit row.
    pub async fn create(
        &self,
        payload: CreateCandidatePayload,
        resume: FileUpload,
        image: FileUpload,
        creator_email: &str,
    ) -> Result<Candidate> {
        if payload.experience < 0 {
            return Err(Error::Validation("Experience must be non-negative".into()));
        }

        let resume_path = self
            .artifacts
            .put(
                ArtifactKind::Resume,
                &resume.data,
                &resume.filename,
                &resume.content_type,
            )
            .await?;
        let image_path = match self
            .artifacts
            .put(
                ArtifactKind::Image,
                &image.data,
                &image.filename,
                &image.content_type,
            )
            .await
        {
            Ok(p) => p,
            Err(e) => {
                // Never leave a half-created candidate's files around.
                self.artifacts.delete(&resume_path).await.ok();
                return Err(e);
            }
        };

        let candidate = match self
            .insert_candidate(&payload, &resume_path, &image_path, creator_email)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                // Never leave a failed intake's files around either.
                self.artifacts.delete(&resume_path).await.ok();
                self.artifacts.delete(&image_path).await.ok();
                return Err(e);
            }
        };

        self.activity
            .log(
                creator_email,
                "candidate_created",
                Some(candidate.id),
                Some(format!("Candidate {} created", candidate.reference_id)),
            )
            .await?;

        Ok(candidate)
    }

    /// Reference ids are counter-based, so two same-day intakes can race to
    /// the same suffix; the UNIQUE constraint rejects the loser, who simply
    /// re-allocates and tries again.
    async fn insert_candidate(
        &self,
        payload: &CreateCandidatePayload,
        resume_path: &str,
        image_path: &str,
        creator_email: &str,
    ) -> Result<Candidate> {
        const ATTEMPTS: u32 = 3;
        let mut last_err = Error::Internal("Reference id allocation failed".into());
        for _ in 0..ATTEMPTS {
            let reference_id = self.next_reference_id().await?;
            let inserted = sqlx::query_as::<_, Candidate>(
                r#"
                INSERT INTO candidates
                    (reference_id, first_name, last_name, email, phone, gender, dob,
                     education, experience, resume_path, image_path, status, assigned_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'new', $12)
                RETURNING id, reference_id, first_name, last_name, email, phone, gender, dob,
                          education, experience, resume_path, image_path,
                          hr_rating, hr_review, tech_rating, tech_review,
                          status, assigned_by, assigned_to, interview_time, reject_reason,
                          created_at, updated_at
                "#,
            )
            .bind(&reference_id)
            .bind(payload.first_name.trim())
            .bind(payload.last_name.trim())
            .bind(payload.email.trim().to_lowercase())
            .bind(payload.phone.trim())
            .bind(&payload.gender)
            .bind(payload.dob)
            .bind(&payload.education)
            .bind(payload.experience)
            .bind(normalize(resume_path))
            .bind(normalize(image_path))
            .bind(creator_email)
            .fetch_one(&self.pool)
            .await;
            match inserted {
                Ok(c) => return Ok(c),
                Err(e) if is_reference_collision(&e) => last_err = e.into(),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err)
    }

    /// Date-prefixed, monotonic within the day.
    async fn next_reference_id(&self) -> Result<String> {
        let prefix = format!("INV-{}", Utc::now().format("%Y%m%d"));
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM candidates WHERE reference_id LIKE $1")
                .bind(format!("{}-%", prefix))
                .fetch_one(&self.pool)
                .await?;
        Ok(format!("{}-{:04}", prefix, count.0 + 1))
    }

    pub async fn get(&self, id: Uuid) -> Result<Candidate> {
        let candidate =
            sqlx::query_as::<_, Candidate>(&format!("{} WHERE id = $1", SELECT_CANDIDATE))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::NotFound("Candidate not found".into()))?;
        Ok(candidate)
    }

    pub async fn list_for_hr(&self, filters: &CandidateFilters) -> Result<Vec<Candidate>> {
        self.list(filters, None).await
    }

    pub async fn list_for_manager(
        &self,
        manager_email: &str,
        filters: &CandidateFilters,
    ) -> Result<Vec<Candidate>> {
        self.list(filters, Some(manager_email)).await
    }

    async fn list(
        &self,
        filters: &CandidateFilters,
        assigned_to: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_CANDIDATE);
        qb.push(" WHERE 1=1");
        if let Some(owner) = assigned_to {
            qb.push(" AND assigned_to = ").push_bind(owner.to_lowercase());
        }
        if let Some(status) = filters.status.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(q) = filters.q.as_deref().filter(|s| !s.trim().is_empty()) {
            let needle = format!("%{}%", q.trim());
            qb.push(" AND (first_name ILIKE ")
                .push_bind(needle.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(needle.clone())
                .push(" OR email ILIKE ")
                .push_bind(needle.clone())
                .push(" OR reference_id ILIKE ")
                .push_bind(needle)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC");

        let candidates = qb.build_query_as::<Candidate>().fetch_all(&self.pool).await?;
        Ok(candidates)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateCandidatePayload,
        actor: &str,
    ) -> Result<Candidate> {
        if matches!(patch.experience, Some(e) if e < 0) {
            return Err(Error::Validation("Experience must be non-negative".into()));
        }

        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates SET
                first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                gender = COALESCE($5, gender),
                dob = COALESCE($6, dob),
                education = COALESCE($7, education),
                experience = COALESCE($8, experience),
                updated_at = NOW()
            WHERE id = $9
            RETURNING id, reference_id, first_name, last_name, email, phone, gender, dob,
                      education, experience, resume_path, image_path,
                      hr_rating, hr_review, tech_rating, tech_review,
                      status, assigned_by, assigned_to, interview_time, reject_reason,
                      created_at, updated_at
            "#,
        )
        .bind(patch.first_name.as_deref().map(str::trim))
        .bind(patch.last_name.as_deref().map(str::trim))
        .bind(patch.email.as_deref().map(|e| e.trim().to_lowercase()))
        .bind(patch.phone.as_deref().map(str::trim))
        .bind(&patch.gender)
        .bind(patch.dob)
        .bind(&patch.education)
        .bind(patch.experience)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Candidate not found".into()))?;

        self.activity
            .log(actor, "candidate_updated", Some(id), None)
            .await?;
        Ok(candidate)
    }

    /// Removes the document first, then its artifacts, so a crash between the
    /// two can only orphan files, never leave a candidate pointing at nothing.
    pub async fn delete(&self, id: Uuid, actor: &str) -> Result<()> {
        let candidate = self.get(id).await?;
        let result = sqlx::query("DELETE FROM candidates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Candidate not found".into()));
        }

        if let Some(path) = &candidate.resume_path {
            self.artifacts.delete(path).await?;
        }
        if let Some(path) = &candidate.image_path {
            self.artifacts.delete(path).await?;
        }

        self.activity
            .log(
                actor,
                "candidate_deleted",
                Some(id),
                Some(format!("Candidate {} deleted", candidate.reference_id)),
            )
            .await?;
        Ok(())
    }
}

fn is_reference_collision(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.constraint())
        .map_or(false, |c| c == "candidates_reference_id_key")
}
