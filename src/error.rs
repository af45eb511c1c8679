// Error types for monofetch.
// Covers fetch outcomes (network, status classes, decode, deadline) and configuration errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Failure side of a fetch outcome.
///
/// Cloneable so a single outcome can be handed to every observer of a
/// computation and kept in a cache entry.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(Arc<reqwest::Error>),

    /// 5xx response.
    #[error("{message}")]
    Server { code: u16, message: String },

    /// Any other non-2xx response.
    #[error("{message}")]
    ClientOrOther { code: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("deadline of {0:?} exceeded while waiting for response")]
    DeadlineExceeded(Duration),

    #[error("invalid request URI: {0}")]
    InvalidUri(String),

    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// HTTP status code carried by the failure, if any.
    pub fn code(&self) -> Option<u16> {
        match self {
            FetchError::Server { code, .. } | FetchError::ClientOrOther { code, .. } => Some(*code),
            FetchError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, FetchError::DeadlineExceeded(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::InvalidUri(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failures_expose_code() {
        let err = FetchError::Server {
            code: 503,
            message: "503 error code-11111".to_string(),
        };
        assert_eq!(err.code(), Some(503));
        assert_eq!(err.to_string(), "503 error code-11111");

        let err = FetchError::ClientOrOther {
            code: 404,
            message: "404 error code-22222".to_string(),
        };
        assert_eq!(err.code(), Some(404));
    }

    #[test]
    fn test_deadline_has_no_code() {
        let err = FetchError::DeadlineExceeded(Duration::from_secs(100));
        assert!(err.is_deadline_exceeded());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err: FetchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
