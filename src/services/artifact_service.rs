use crate::error::{Error, Result};
use bytes::Bytes;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use tokio::fs;

/// Per-file cap; a blob of exactly this size is accepted.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Segment the HTTP layer prepends exactly once when building URLs. Stored
/// paths are relative to the public static root and never start with it.
const LEGACY_PREFIX: &str = "static/";

/// An uploaded blob plus the metadata the browser sent with it.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub data: Bytes,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Resume,
    Image,
}

impl ArtifactKind {
    fn dir(&self) -> &'static str {
        match self {
            ArtifactKind::Resume => "resumes",
            ArtifactKind::Image => "images",
        }
    }

    fn check_content(&self, content_type: &str, data: &[u8]) -> Result<()> {
        match self {
            ArtifactKind::Resume => {
                if content_type != "application/pdf" {
                    return Err(Error::Validation(format!(
                        "Unsupported resume content type: {}",
                        content_type
                    )));
                }
                if !data.starts_with(b"%PDF") {
                    return Err(Error::Validation("Invalid PDF file content".into()));
                }
            }
            ArtifactKind::Image => match content_type {
                "image/jpeg" => {
                    if !data.starts_with(&[0xFF, 0xD8]) {
                        return Err(Error::Validation("Invalid JPEG file content".into()));
                    }
                }
                "image/png" => {
                    if !data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
                        return Err(Error::Validation("Invalid PNG file content".into()));
                    }
                }
                "image/webp" => {
                    if !(data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP")) {
                        return Err(Error::Validation("Invalid WebP file content".into()));
                    }
                }
                other => {
                    return Err(Error::Validation(format!(
                        "Unsupported image content type: {}",
                        other
                    )));
                }
            },
        }
        Ok(())
    }
}

/// Sole writer of candidate `*_path` fields. Persists blobs under the public
/// static tree with a temp-then-rename discipline and hands back canonical
/// relative paths of the form `uploads/<kind>s/<uuid>-<basename>`.
#[derive(Clone)]
pub struct ArtifactService {
    root: PathBuf,
}

impl ArtifactService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn put(
        &self,
        kind: ArtifactKind,
        data: &Bytes,
        original_filename: &str,
        content_type: &str,
    ) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Validation("Empty file upload".into()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(Error::Validation(format!(
                "File exceeds the {} MB limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        kind.check_content(content_type, data)?;

        let safe_name = sanitize_filename(original_filename);
        let dir = self.root.join(kind.dir());
        fs::create_dir_all(&dir).await?;

        let file_id = uuid::Uuid::new_v4();
        let final_name = format!("{}-{}", file_id, safe_name);
        let tmp_path = dir.join(format!(".tmp-{}", file_id));
        let final_path = dir.join(&final_name);

        // Temp-then-rename so readers never observe a torn write.
        fs::write(&tmp_path, data).await?;
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(format!("uploads/{}/{}", kind.dir(), final_name))
    }

    /// Idempotent; a missing file is not an error.
    pub async fn delete(&self, relative_path: &str) -> Result<()> {
        let Some(disk_path) = self.disk_path(relative_path) else {
            return Ok(());
        };
        match fs::remove_file(&disk_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, relative_path: &str) -> bool {
        match self.disk_path(relative_path) {
            Some(p) => fs::try_exists(&p).await.unwrap_or(false),
            None => false,
        }
    }

    fn disk_path(&self, relative_path: &str) -> Option<PathBuf> {
        let normalized = normalize(relative_path);
        let rest = normalized.strip_prefix("uploads/")?;
        if rest.contains("..") {
            return None;
        }
        Some(self.root.join(rest))
    }

    /// Repairs rows written by an earlier implementation that prefixed paths
    /// with the public-root segment. One-shot, safe to re-run.
    pub async fn normalize_stored_paths(&self, pool: &PgPool) -> Result<u64> {
        let rows = sqlx::query(
            r#"SELECT id, resume_path, image_path FROM candidates
               WHERE resume_path LIKE 'static/%' OR image_path LIKE 'static/%'"#,
        )
        .fetch_all(pool)
        .await?;

        let mut repaired = 0u64;
        for row in rows {
            let id: uuid::Uuid = row.try_get("id")?;
            let resume: Option<String> = row.try_get("resume_path")?;
            let image: Option<String> = row.try_get("image_path")?;
            sqlx::query(
                r#"UPDATE candidates SET resume_path = $1, image_path = $2, updated_at = NOW()
                   WHERE id = $3"#,
            )
            .bind(resume.as_deref().map(normalize))
            .bind(image.as_deref().map(normalize))
            .bind(id)
            .execute(pool)
            .await?;
            repaired += 1;
        }
        Ok(repaired)
    }
}

/// Strips the legacy `static/` prefix; everything else passes through.
pub fn normalize(p: &str) -> String {
    p.strip_prefix(LEGACY_PREFIX).unwrap_or(p).to_string()
}

/// Strips directory components, collapses whitespace and restricts to a
/// conservative ASCII subset, keeping the extension.
pub fn sanitize_filename(original: &str) -> String {
    let basename = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();

    let mut out = String::with_capacity(basename.len());
    let mut last_was_space = false;
    for c in basename.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push('_');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> ArtifactService {
        let dir = std::env::temp_dir().join(format!("artifact-test-{}", uuid::Uuid::new_v4()));
        ArtifactService::new(dir)
    }

    fn pdf_bytes(len: usize) -> Bytes {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.resize(len, b' ');
        Bytes::from(data)
    }

    #[test]
    fn normalize_strips_legacy_prefix_once() {
        assert_eq!(normalize("static/uploads/resumes/a.pdf"), "uploads/resumes/a.pdf");
        assert_eq!(normalize("uploads/resumes/a.pdf"), "uploads/resumes/a.pdf");
    }

    #[test]
    fn normalize_is_idempotent() {
        for p in ["static/uploads/x.pdf", "uploads/x.pdf", "x.pdf", ""] {
            assert_eq!(normalize(&normalize(p)), normalize(p));
        }
    }

    #[test]
    fn sanitize_drops_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("c:\\temp\\cv.pdf"), "cv.pdf");
        assert_eq!(sanitize_filename("my   resume (final).pdf"), "my_resume_final.pdf");
        assert_eq!(sanitize_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(sanitize_filename("...."), "file");
    }

    #[tokio::test]
    async fn put_returns_canonical_relative_path() {
        let store = scratch_store();
        let path = store
            .put(ArtifactKind::Resume, &pdf_bytes(64), "Jane Doe.pdf", "application/pdf")
            .await
            .unwrap();
        assert!(path.starts_with("uploads/resumes/"));
        assert!(!path.starts_with("static/"));
        assert!(path.ends_with("-Jane_Doe.pdf"));
        assert!(store.exists(&path).await);
    }

    #[tokio::test]
    async fn size_cap_is_exact() {
        let store = scratch_store();
        let at_cap = store
            .put(ArtifactKind::Resume, &pdf_bytes(MAX_UPLOAD_BYTES), "a.pdf", "application/pdf")
            .await;
        assert!(at_cap.is_ok());

        let over = store
            .put(
                ArtifactKind::Resume,
                &pdf_bytes(MAX_UPLOAD_BYTES + 1),
                "b.pdf",
                "application/pdf",
            )
            .await;
        assert!(matches!(over, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn content_type_and_magic_are_enforced() {
        let store = scratch_store();
        let err = store
            .put(ArtifactKind::Resume, &Bytes::from_static(b"hello"), "a.pdf", "application/pdf")
            .await;
        assert!(matches!(err, Err(Error::Validation(_))));

        let err = store
            .put(ArtifactKind::Image, &pdf_bytes(32), "a.pdf", "application/pdf")
            .await;
        assert!(matches!(err, Err(Error::Validation(_))));

        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert!(store
            .put(ArtifactKind::Image, &jpeg, "photo.jpg", "image/jpeg")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = scratch_store();
        let path = store
            .put(ArtifactKind::Image, &Bytes::from_static(&[0xFF, 0xD8, 0x00]), "p.jpg", "image/jpeg")
            .await
            .unwrap();
        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await);
        // Second delete of a missing file is still Ok.
        store.delete(&path).await.unwrap();
        // Legacy-prefixed paths are normalized before lookup.
        store.delete(&format!("static/{}", path)).await.unwrap();
    }
}
