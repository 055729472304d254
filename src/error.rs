/// Error types shared by the store, blob and download layers.
/// Absence on read paths is modelled as `Option`, never as an error.
use thiserror::Error;

/// A document existed but could not be decoded into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed document at '{path}': {message}")]
pub struct DecodeError {
    pub path: String,
    pub message: String,
}

impl DecodeError {
    pub fn new(path: impl Into<String>, message: impl ToString) -> Self {
        Self {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Path was empty, had an empty segment, or addressed the wrong kind of node
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    /// Only raised where the store enforces existence (merge updates, blob lookups)
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to encode document: {0}")]
    Encode(String),
    #[error("live stream closed")]
    Closed,
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}

impl StoreError {
    /// Maps a non-success HTTP status from the store into the matching variant.
    pub fn from_status(status: reqwest::StatusCode, resource: &str, body: String) -> Self {
        match status {
            reqwest::StatusCode::NOT_FOUND => StoreError::NotFound(resource.to_string()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                StoreError::PermissionDenied(format!("{} ({})", resource, status))
            }
            _ => StoreError::Status {
                status: status.as_u16(),
                message: body,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP {status} while fetching {url}")]
    Http { status: u16, url: String },
    #[error("request error: {0}")]
    Transport(String),
    #[error("base64 conversion failed: {0}")]
    Encoding(String),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = StoreError::from_status(reqwest::StatusCode::NOT_FOUND, "apks/1", String::new());
        assert!(matches!(err, StoreError::NotFound(ref p) if p == "apks/1"));

        let err = StoreError::from_status(reqwest::StatusCode::FORBIDDEN, "apks/1", String::new());
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        let err = StoreError::from_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "apks",
            "boom".to_string(),
        );
        match err {
            StoreError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::new("apks/9", "missing field `apkUrl`");
        assert_eq!(
            err.to_string(),
            "malformed document at 'apks/9': missing field `apkUrl`"
        );
    }
}
