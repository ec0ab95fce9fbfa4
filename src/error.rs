//! Error types for the frame client.

use thiserror::Error;

/// Errors that can occur while talking to the frame device API.
///
/// Payloads are flattened to strings so the type is `Clone`: a coalesced
/// refresh hands the same outcome to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Missing or invalid static configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Login endpoint rejected the request
    #[error("Login failed with status {status}: {body}")]
    Login {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Refresh endpoint rejected the request
    #[error("Token refresh failed with status {status}: {body}")]
    Refresh {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Request was still unauthorized after re-authenticating
    #[error("Unauthorized after re-authentication: {body}")]
    Unauthorized {
        /// Response body of the final 401
        body: String,
    },

    /// Input bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Resized image could not be encoded
    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    /// Convert endpoint returned an error status
    #[error("Upload failed with status {status}: {body}")]
    Upload {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Status endpoint returned an error status
    #[error("Conversion status poll failed with status {status}: {body}")]
    Poll {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Conversion job was still pending when polling gave up
    #[error("Conversion job {queue_id} still pending after {elapsed:?}")]
    PollTimeout {
        /// Server queue job id
        queue_id: String,
        /// Time spent polling
        elapsed: std::time::Duration,
    },

    /// 2xx response whose body did not have the expected shape
    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse {
        /// Endpoint path that produced the body
        endpoint: &'static str,
        /// Parse error detail
        message: String,
    },
}

impl Error {
    /// Whether this error came from authentication (login, refresh, or a
    /// persistent 401).
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::Login { .. } | Error::Refresh { .. } | Error::Unauthorized { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Request(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Upload {
            status: 413,
            body: "Payload too large".to_string(),
        };
        assert!(err.to_string().contains("413"));
        assert!(err.to_string().contains("Payload too large"));

        let err = Error::MalformedResponse {
            endpoint: "/api/v1/item/convert",
            message: "missing field `queueId`".to_string(),
        };
        assert!(err.to_string().contains("/api/v1/item/convert"));

        let err = Error::PollTimeout {
            queue_id: "q-9".to_string(),
            elapsed: std::time::Duration::from_secs(120),
        };
        assert!(err.to_string().contains("q-9"));
        assert!(!err.to_string().contains("status"));
    }

    #[test]
    fn test_is_auth() {
        assert!(Error::Login {
            status: 400,
            body: String::new()
        }
        .is_auth());
        assert!(Error::Unauthorized {
            body: String::new()
        }
        .is_auth());
        assert!(!Error::Config("missing frame id".to_string()).is_auth());
        assert!(!Error::Poll {
            status: 500,
            body: String::new()
        }
        .is_auth());
    }
}
