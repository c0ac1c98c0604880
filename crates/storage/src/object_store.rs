use std::time::Duration;

use amora_domain::storage::{ObjectStore, StorageError, StorageResult};
use amora_domain::ObjectStorageConfig;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("failed to build object storage client: {0}")]
    Init(#[from] reqwest::Error),
}

/// Checks uploaded objects with `HEAD {base}/storage/v1/object/{bucket}/{path}`.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, ObjectStoreError> {
        let client = reqwest::Client::builder()
            .user_agent("amora-integrity/0.1")
            .timeout(HEAD_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }

    /// `None` when the base URL or the service key is not configured.
    pub fn from_config(config: &ObjectStorageConfig) -> Result<Option<Self>, ObjectStoreError> {
        match (config.base_url(), config.service_key()) {
            (Some(base_url), Some(service_key)) => {
                Self::new(base_url, service_key, config.gallery_bucket()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn object_exists(&self, path: &str) -> StorageResult<bool> {
        let url = self.object_url(path);
        let response = self
            .client
            .head(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await
            .map_err(StorageError::from_source)?;

        let status = response.status();
        debug!(%url, %status, "object head");
        match status {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
            other => Err(StorageError::Database(format!(
                "object head for {path} returned {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_joins_bucket_and_path() {
        let store = HttpObjectStore::new("https://files.example.com/", "key", "gallery").unwrap();
        assert_eq!(
            store.object_url("/u1/photo.jpg"),
            "https://files.example.com/storage/v1/object/gallery/u1/photo.jpg"
        );
    }
}
