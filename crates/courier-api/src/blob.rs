use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Durable identity returned by the blob-storage service.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobResource {
    pub url: String,
    pub resource_type: String,
}

/// External blob-storage capability: store a staged file and get back a
/// durable URL plus resource-kind metadata. Abstracted so intake can be
/// exercised against a stub in tests.
pub trait BlobStore: Send + Sync {
    fn upload(
        &self,
        local_path: &Path,
        mimetype: &str,
    ) -> impl Future<Output = Result<BlobResource>> + Send;

    fn delete(&self, url: &str) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP client for the blob service. Uploads are a single POST of the raw
/// bytes; the service answers with `{ "url": ..., "resource_type": ... }`.
#[derive(Clone)]
pub struct BlobClient {
    http: reqwest::Client,
    base_url: String,
}

impl BlobClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl BlobStore for BlobClient {
    async fn upload(&self, local_path: &Path, mimetype: &str) -> Result<BlobResource> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("reading staged file {}", local_path.display()))?;

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, mimetype)
            .body(bytes)
            .send()
            .await
            .context("blob upload request failed")?
            .error_for_status()
            .context("blob service rejected upload")?;

        let resource: BlobResource = response
            .json()
            .await
            .context("malformed blob service response")?;

        info!("Uploaded blob: {}", resource.url);
        Ok(resource)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.http
            .delete(url)
            .send()
            .await
            .context("blob delete request failed")?
            .error_for_status()
            .context("blob service rejected delete")?;
        Ok(())
    }
}
