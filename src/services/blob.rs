//! Binary storage behind the attachment metadata rows.
//!
//! The trait keeps handlers unaware of where bytes live: a directory on the
//! serving host, or a remote object store reached over HTTP that hands out
//! time-bounded download URLs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How long a remote download URL stays valid.
const SIGNED_URL_TTL_SECS: u64 = 3600;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch a blob, `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Drop a blob. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// A URL the client can fetch the blob from.
    async fn url_for(&self, key: &str) -> Result<String>;
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a key to a path under the root. Keys are server-generated and
    /// contain no separators, but the check stays as a second line of
    /// defense for anything that reaches this via the serve endpoint.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }
        Ok(self.root.join(key))
    }
}

/// Reject anything that could escape the storage root.
#[must_use]
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains("..")
        && !key.starts_with('/')
        && !key.contains('\\')
        && !Path::new(key).is_absolute()
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("Failed to create upload directory")?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {key}"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read blob {key}")),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove blob {key}")),
        }
    }

    async fn url_for(&self, key: &str) -> Result<String> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }
        Ok(format!("/uploads/{key}"))
    }
}

/// Object store reached over HTTP. Downloads go through signed URLs minted
/// by the store so the raw objects are never exposed.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Deserialize)]
struct SignResponse {
    url: String,
}

impl HttpBlobStore {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String, access_token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }

        self.client
            .put(format!("{}/objects/{key}", self.base_url))
            .bearer_auth(&self.access_token)
            .body(bytes.to_vec())
            .send()
            .await
            .context("Blob store unreachable")?
            .error_for_status()
            .context("Blob store rejected upload")?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }

        let response = self
            .client
            .get(format!("{}/objects/{key}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Blob store unreachable")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = response
            .error_for_status()
            .context("Blob store rejected download")?
            .bytes()
            .await
            .context("Failed to read blob body")?;

        Ok(Some(bytes.to_vec()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }

        let response = self
            .client
            .delete(format!("{}/objects/{key}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Blob store unreachable")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        response
            .error_for_status()
            .context("Blob store rejected delete")?;

        Ok(())
    }

    async fn url_for(&self, key: &str) -> Result<String> {
        if !is_safe_key(key) {
            anyhow::bail!("Refusing unsafe storage key");
        }

        let signed: SignResponse = self
            .client
            .post(format!("{}/sign", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "key": key,
                "expires_in": SIGNED_URL_TTL_SECS,
            }))
            .send()
            .await
            .context("Blob store unreachable")?
            .error_for_status()
            .context("Blob store refused to sign URL")?
            .json()
            .await
            .context("Malformed signing response")?;

        Ok(signed.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(!is_safe_key("../etc/passwd"));
        assert!(!is_safe_key("/etc/passwd"));
        assert!(!is_safe_key("a/../b"));
        assert!(!is_safe_key("a\\..\\b"));
        assert!(!is_safe_key(""));
    }

    #[test]
    fn generated_keys_pass() {
        assert!(is_safe_key("1f2e3d4c5b6a7988_report.pdf"));
        assert!(is_safe_key("deadbeefdeadbeef_screen shot.png"));
    }
}
