use crate::error::StoreError;
use moka::future::Cache;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

const STORAGE_ENDPOINT: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Object storage addressed by path; resolves paths to download URLs.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn download_url(&self, path: &str) -> Result<String, StoreError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    /// Comma-separated list; the first token is used.
    download_tokens: Option<String>,
}

pub struct FirebaseStorage {
    client: Client,
    endpoint: String,
    bucket: String,
    // Resolved URLs are token-bearing and stable, keep them for an hour
    url_cache: Cache<String, String>,
}

impl FirebaseStorage {
    pub fn new(bucket: &str, timeout: Duration) -> Self {
        Self::with_endpoint(STORAGE_ENDPOINT, bucket, timeout)
    }

    pub fn with_endpoint(endpoint: &str, bucket: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("apk-store/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            url_cache: Cache::builder()
                .max_capacity(1000)
                .time_to_live(Duration::from_secs(3600))
                .build(),
        }
    }

    /// `{endpoint}/{bucket}/o/{path}` with the whole object path as one encoded segment.
    fn object_url(&self, path: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!("{}/{}/o", self.endpoint, self.bucket))
            .map_err(|e| StoreError::Config(format!("bad storage endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("storage endpoint cannot be a base".to_string()))?
            .push(path.trim_start_matches('/'));
        Ok(url)
    }

    pub fn clear_cache(&self) {
        self.url_cache.invalidate_all();
    }
}

#[async_trait::async_trait]
impl BlobStore for FirebaseStorage {
    async fn download_url(&self, path: &str) -> Result<String, StoreError> {
        if let Some(cached) = self.url_cache.get(path).await {
            return Ok(cached);
        }

        let url = self.object_url(path)?;
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status, path, body));
        }
        let meta: ObjectMetadata = resp.json().await?;

        let mut media = url;
        media.query_pairs_mut().append_pair("alt", "media");
        if let Some(token) = meta
            .download_tokens
            .as_deref()
            .and_then(|t| t.split(',').next())
            .filter(|t| !t.is_empty())
        {
            media.query_pairs_mut().append_pair("token", token);
        }

        let resolved = media.to_string();
        self.url_cache
            .insert(path.to_string(), resolved.clone())
            .await;
        Ok(resolved)
    }
}

/// Publicly readable bucket or CDN: URLs are the base joined with the path.
pub struct PublicBlobStore {
    base_url: String,
}

impl PublicBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for PublicBlobStore {
    async fn download_url(&self, path: &str) -> Result<String, StoreError> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(format!("{}/{}", self.base_url, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_slashes() {
        let storage = FirebaseStorage::new("demo.appspot.com", Duration::from_secs(5));
        let url = storage.object_url("apks/tools/app v2.apk").unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/apks%2Ftools%2Fapp%20v2.apk"
        );
    }

    #[tokio::test]
    async fn test_cached_url_skips_network() {
        // Unroutable endpoint: any network call would fail.
        let storage = FirebaseStorage::with_endpoint(
            "http://127.0.0.1:9/v0/b",
            "demo",
            Duration::from_millis(200),
        );
        storage
            .url_cache
            .insert("apks/a.apk".to_string(), "https://cdn/a.apk".to_string())
            .await;
        assert_eq!(
            storage.download_url("apks/a.apk").await.unwrap(),
            "https://cdn/a.apk"
        );

        storage.clear_cache();
        assert!(storage.download_url("apks/a.apk").await.is_err());
    }

    #[tokio::test]
    async fn test_public_blob_store() {
        let blobs = PublicBlobStore::new("https://cdn.example.com/");
        assert_eq!(
            blobs.download_url("/apks/a.apk").await.unwrap(),
            "https://cdn.example.com/apks/a.apk"
        );
        assert!(blobs.download_url("").await.is_err());
    }
}
