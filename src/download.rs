use crate::error::DownloadError;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APK_MIME: &str = "application/vnd.android.package-archive";

#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("apk-store/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DownloadError::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        let data = resp
            .bytes()
            .await
            .map_err(|e| DownloadError::Transport(e.to_string()))?;
        Ok(data.to_vec())
    }
}

/// Host the client runs on. Only Android gets files written.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
    Web,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    pub fn writes_downloads(&self) -> bool {
        matches!(self, Platform::Android)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Desktop => "desktop",
            Platform::Web => "web",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "desktop" => Ok(Platform::Desktop),
            "web" => Ok(Platform::Web),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: usize },
    /// Fetched and encoded, but the platform keeps no local copy.
    Skipped { platform: Platform, encoded_len: usize },
}

pub struct DownloadPipeline<F: HttpFetcher> {
    fetcher: F,
    platform: Platform,
    storage_root: PathBuf,
    target: PathBuf,
}

impl<F: HttpFetcher> DownloadPipeline<F> {
    pub fn new(fetcher: F, platform: Platform, storage_root: PathBuf, target: PathBuf) -> Self {
        Self {
            fetcher,
            platform,
            storage_root,
            target,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn destination(&self) -> PathBuf {
        self.storage_root.join(&self.target)
    }

    /// Fetch, encode, then write on Android. Each step finishes before the next starts.
    pub async fn run(&self, url: &str) -> Result<DownloadOutcome, DownloadError> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        log::debug!("Fetched {} bytes from {}", bytes.len(), url);

        let data_url = encode_data_url(bytes).await?;

        if !self.platform.writes_downloads() {
            log::info!(
                "Platform {} keeps no local copy; skipping write of {}",
                self.platform,
                url
            );
            return Ok(DownloadOutcome::Skipped {
                platform: self.platform,
                encoded_len: data_url.len(),
            });
        }

        let payload = strip_data_url_header(&data_url)
            .ok_or_else(|| DownloadError::Encoding("missing data URL header".to_string()))?;
        let decoded = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| DownloadError::Encoding(e.to_string()))?;

        let path = self.destination();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &decoded).await?;
        log::info!("APK saved to {}", path.display());

        Ok(DownloadOutcome::Saved {
            path,
            bytes: decoded.len(),
        })
    }
}

/// Base64 data URL for the payload, built off the async runtime.
pub async fn encode_data_url(bytes: Vec<u8>) -> Result<String, DownloadError> {
    tokio::task::spawn_blocking(move || {
        format!("data:{};base64,{}", APK_MIME, BASE64_STANDARD.encode(&bytes))
    })
    .await
    .map_err(|e| DownloadError::Task(e.to_string()))
}

/// The base64 payload after the first comma of a data URL.
pub fn strip_data_url_header(data_url: &str) -> Option<&str> {
    if !data_url.starts_with("data:") {
        return None;
    }
    data_url.split_once(',').map(|(_, payload)| payload)
}

// ----------------------
// Mocks & Tests
// ----------------------

#[cfg(test)]
pub struct MockFetcher {
    pub responses: std::sync::Arc<
        std::sync::Mutex<std::collections::HashMap<String, Result<Vec<u8>, u16>>>,
    >,
    pub calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Default::default(),
            calls: Default::default(),
        }
    }

    pub fn mock_response(&self, url: &str, data: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(data));
    }

    pub fn mock_status(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(status));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl HttpFetcher for MockFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(Ok(data)) => Ok(data.clone()),
            Some(Err(status)) => Err(DownloadError::Http {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(DownloadError::Transport(format!("Mock unreachable: {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://cdn.example.com/app.apk";

    fn pipeline(platform: Platform, root: &std::path::Path) -> DownloadPipeline<MockFetcher> {
        DownloadPipeline::new(
            MockFetcher::new(),
            platform,
            root.to_path_buf(),
            PathBuf::from("Download/app.apk"),
        )
    }

    #[tokio::test]
    async fn test_android_writes_decoded_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(Platform::Android, dir.path());
        let payload: Vec<u8> = (0u8..=255).collect();
        p.fetcher.mock_response(URL, payload.clone());

        let outcome = p.run(URL).await.unwrap();
        let expected_path = dir.path().join("Download/app.apk");
        assert_eq!(
            outcome,
            DownloadOutcome::Saved {
                path: expected_path.clone(),
                bytes: 256
            }
        );
        assert_eq!(std::fs::read(expected_path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_other_platforms_fetch_but_do_not_write() {
        for platform in [Platform::Web, Platform::Desktop, Platform::Ios] {
            let dir = tempfile::tempdir().unwrap();
            let p = pipeline(platform, dir.path());
            p.fetcher.mock_response(URL, b"PK\x03\x04".to_vec());

            let outcome = p.run(URL).await.unwrap();
            let expected_len = format!("data:{};base64,UEsDBA==", APK_MIME).len();
            assert_eq!(
                outcome,
                DownloadOutcome::Skipped {
                    platform,
                    encoded_len: expected_len
                }
            );
            assert_eq!(p.fetcher.call_count(), 1);
            assert!(!p.destination().exists());
        }
    }

    #[tokio::test]
    async fn test_http_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(Platform::Android, dir.path());
        p.fetcher.mock_status(URL, 404);

        let err = p.run(URL).await.unwrap_err();
        assert!(matches!(err, DownloadError::Http { status: 404, .. }));
        assert!(!p.destination().exists());
    }

    #[tokio::test]
    async fn test_encode_data_url() {
        let url = encode_data_url(b"hi".to_vec()).await.unwrap();
        assert_eq!(url, format!("data:{};base64,aGk=", APK_MIME));
        assert_eq!(strip_data_url_header(&url), Some("aGk="));
        assert_eq!(strip_data_url_header("aGk="), None);
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Android".parse::<Platform>(), Ok(Platform::Android));
        assert!("symbian".parse::<Platform>().is_err());
        assert!(Platform::Android.writes_downloads());
        assert!(!Platform::Web.writes_downloads());
    }
}
