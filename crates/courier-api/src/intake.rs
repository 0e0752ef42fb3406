use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use chrono::Utc;
use tracing::warn;

use courier_types::models::{Attachment, AttachmentKind};

use crate::blob::BlobStore;
use crate::error::ApiError;

/// A file staged on local disk, ready for upload.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub local_path: PathBuf,
    pub mimetype: String,
    pub original_name: String,
    pub size: u64,
}

/// Upload policy, built once from config at startup.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub staging_dir: PathBuf,
    pub max_file_bytes: u64,
    pub max_files: usize,
    /// Accepted top-level MIME classes, e.g. ["image"].
    pub allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn allows(&self, mimetype: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|t| mimetype.starts_with(&format!("{t}/")))
    }
}

/// Storage-local unique name: original stem, millisecond timestamp, random
/// suffix, original extension preserved. Collision avoidance only — the
/// persisted attachment carries the blob service's identity, not this name.
pub fn staged_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let suffix: u32 = rand::random();
    format!("{stem}-{}-{suffix}{ext}", Utc::now().timestamp_millis())
}

/// Drains a multipart request into the staging directory, enforcing the
/// file-count cap, the per-file size ceiling, and the MIME policy. Returns
/// the optional `content` text field alongside the staged files. MIME
/// rejection happens before any bytes are written or uploaded. On any
/// rejection, everything staged so far is removed before the error returns.
pub async fn stage_multipart(
    policy: &UploadPolicy,
    mut multipart: Multipart,
) -> Result<(Option<String>, Vec<StagedFile>), ApiError> {
    tokio::fs::create_dir_all(&policy.staging_dir)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("creating staging dir: {e}")))?;

    let mut content: Option<String> = None;
    let mut staged: Vec<StagedFile> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                discard(&staged).await;
                return Err(ApiError::Validation(format!("Malformed multipart request: {e}")));
            }
        };

        let field_name = field.name().map(str::to_string);
        let Some(original_name) = field.file_name().map(str::to_string) else {
            if field_name.as_deref() == Some("content") {
                content = field.text().await.ok().filter(|s| !s.trim().is_empty());
            }
            continue;
        };

        if staged.len() >= policy.max_files {
            discard(&staged).await;
            return Err(ApiError::Validation(format!(
                "At most {} files per message",
                policy.max_files
            )));
        }

        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !policy.allows(&mimetype) {
            discard(&staged).await;
            return Err(ApiError::UnsupportedMediaType(mimetype));
        }

        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                discard(&staged).await;
                return Err(ApiError::Validation(format!("Failed to read file '{original_name}': {e}")));
            }
        };
        if bytes.len() as u64 > policy.max_file_bytes {
            discard(&staged).await;
            return Err(ApiError::Validation(format!(
                "File '{}' exceeds the {} byte limit",
                original_name, policy.max_file_bytes
            )));
        }

        let local_path = policy.staging_dir.join(staged_name(&original_name));
        if let Err(e) = tokio::fs::write(&local_path, &bytes).await {
            discard(&staged).await;
            return Err(ApiError::Internal(anyhow::anyhow!(
                "staging {}: {e}",
                local_path.display()
            )));
        }

        staged.push(StagedFile {
            local_path,
            mimetype,
            original_name,
            size: bytes.len() as u64,
        });
    }

    Ok((content, staged))
}

/// Uploads every staged file through the blob capability. All-or-nothing:
/// one failed upload fails the whole batch so a message is never persisted
/// with a partial attachment set. Each staged file is removed after the
/// terminal outcome of its upload attempt; a leaked temp file is a defect.
pub async fn ingest<B: BlobStore>(
    blobs: &B,
    staged: Vec<StagedFile>,
) -> Result<Vec<Attachment>, ApiError> {
    let mut attachments = Vec::with_capacity(staged.len());

    for (idx, file) in staged.iter().enumerate() {
        let result = blobs.upload(&file.local_path, &file.mimetype).await;
        remove_staged(file).await;

        match result {
            Ok(resource) => attachments.push(Attachment {
                url: resource.url,
                kind: AttachmentKind::from_resource_kind(&resource.resource_type),
                name: file.original_name.clone(),
                size: file.size,
            }),
            Err(e) => {
                discard(&staged[idx + 1..]).await;
                return Err(ApiError::Upload(format!("{}: {:#}", file.original_name, e)));
            }
        }
    }

    Ok(attachments)
}

/// Removes staged files that will not be uploaded.
pub async fn discard(staged: &[StagedFile]) {
    for file in staged {
        remove_staged(file).await;
    }
}

async fn remove_staged(file: &StagedFile) {
    if let Err(e) = tokio::fs::remove_file(&file.local_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(
                "Failed to remove staged file {}: {}",
                file.local_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobResource;

    fn policy() -> UploadPolicy {
        UploadPolicy {
            staging_dir: std::env::temp_dir().join("courier-intake-tests"),
            max_file_bytes: 5 * 1024 * 1024,
            max_files: 10,
            allowed_types: vec!["image".to_string()],
        }
    }

    async fn stage_fixture(name: &str, bytes: &[u8]) -> StagedFile {
        let dir = policy().staging_dir;
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let local_path = dir.join(staged_name(name));
        tokio::fs::write(&local_path, bytes).await.unwrap();
        StagedFile {
            local_path,
            mimetype: "image/png".into(),
            original_name: name.into(),
            size: bytes.len() as u64,
        }
    }

    /// Succeeds for every file except ones whose staged path contains
    /// `fail_on`.
    struct StubStore {
        fail_on: Option<&'static str>,
    }

    impl BlobStore for StubStore {
        async fn upload(&self, local_path: &Path, _mimetype: &str) -> anyhow::Result<BlobResource> {
            if let Some(marker) = self.fail_on {
                if local_path.to_string_lossy().contains(marker) {
                    anyhow::bail!("blob service unavailable");
                }
            }
            // The file must still exist at upload time.
            anyhow::ensure!(local_path.exists(), "staged file missing");
            Ok(BlobResource {
                url: format!(
                    "https://blobs.example/{}",
                    local_path.file_name().unwrap().to_string_lossy()
                ),
                resource_type: "image".into(),
            })
        }

        async fn delete(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn staged_names_are_unique_and_keep_the_extension() {
        let a = staged_name("photo.png");
        let b = staged_name("photo.png");
        assert_ne!(a, b);
        assert!(a.starts_with("photo-"));
        assert!(a.ends_with(".png"));
        // no extension stays that way
        assert!(!staged_name("README").contains('.'));
    }

    #[test]
    fn policy_accepts_only_configured_classes() {
        let p = policy();
        assert!(p.allows("image/png"));
        assert!(p.allows("image/jpeg"));
        assert!(!p.allows("application/pdf"));
        assert!(!p.allows("video/mp4"));
        assert!(!p.allows("imagery/fake"));
    }

    #[tokio::test]
    async fn ingest_uploads_all_and_cleans_up() {
        let first = stage_fixture("a.png", b"aaaa").await;
        let second = stage_fixture("b.png", b"bbbbbb").await;
        let paths = [first.local_path.clone(), second.local_path.clone()];

        let store = StubStore { fail_on: None };
        let attachments = ingest(&store, vec![first, second]).await.unwrap();

        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, "a.png");
        assert_eq!(attachments[0].kind, AttachmentKind::Image);
        assert_eq!(attachments[0].size, 4);
        assert_eq!(attachments[1].size, 6);
        for path in &paths {
            assert!(!path.exists(), "staged file leaked: {}", path.display());
        }
    }

    #[tokio::test]
    async fn one_failed_upload_fails_the_batch_and_leaks_nothing() {
        let first = stage_fixture("ok.png", b"aaaa").await;
        let bad = stage_fixture("bad.png", b"bbbb").await;
        let third = stage_fixture("never.png", b"cccc").await;
        let paths = [
            first.local_path.clone(),
            bad.local_path.clone(),
            third.local_path.clone(),
        ];

        let store = StubStore { fail_on: Some("bad") };
        let err = ingest(&store, vec![first, bad, third]).await.unwrap_err();

        assert!(matches!(err, ApiError::Upload(_)));
        for path in &paths {
            assert!(!path.exists(), "staged file leaked: {}", path.display());
        }
    }

    #[tokio::test]
    async fn discard_removes_everything() {
        let a = stage_fixture("x.png", b"x").await;
        let b = stage_fixture("y.png", b"y").await;
        let paths = [a.local_path.clone(), b.local_path.clone()];

        discard(&[a, b]).await;
        for path in &paths {
            assert!(!path.exists());
        }
    }
}
