//! Device API protocol types.
//!
//! The API is undocumented; these types match what the service has been
//! observed to send and accept. Responses sometimes arrive wrapped in a
//! `{"data": ...}` envelope and sometimes bare, so every response is read
//! through [`Envelope`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// Login endpoint (signed query, no bearer token)
pub const LOGIN_PATH: &str = "/api/v1/auth/login";

/// Token refresh endpoint
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh-token";

/// Image submission endpoint (multipart)
pub const CONVERT_PATH: &str = "/api/v1/item/convert";

/// Conversion status endpoint
pub const IS_CONVERTED_PATH: &str = "/api/v1/item/is-converted";

pub const HEADER_COUNTRY: &str = "x-header-country";
pub const HEADER_LANGUAGE: &str = "x-header-language";
pub const HEADER_CLIENT_ID: &str = "x-header-clientid";
pub const HEADER_DEVICE_ID: &str = "x-header-deviceid";

/// Status reported while the server is still converting.
pub const STATUS_PENDING: &str = "pending";

/// Body of POST /api/v1/auth/login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub device_id: &'a str,
}

/// Body of POST /api/v1/auth/refresh-token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub device_id: &'a str,
}

/// Token grant returned by login and refresh.
///
/// `expires_at` is an absolute Unix timestamp in seconds, not a duration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    /// Refresh responses may omit this; the previous one stays valid then
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: i64,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Server job created by the convert endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    /// Queue job identifier, polled via the status endpoint
    #[serde(deserialize_with = "string_or_number")]
    pub queue_id: String,

    /// Any additional fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Body of POST /api/v1/item/is-converted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsConvertedRequest<'a> {
    pub queue_id: &'a str,
}

/// One status report for a queue job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStatus {
    /// `"pending"` while converting; anything else is terminal
    pub status: String,

    /// Any additional fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ConversionStatus {
    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }
}

/// Response body that may or may not be wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// Parse a 2xx body, tolerating either envelope shape.
pub fn parse_body<T>(endpoint: &'static str, body: &str) -> Result<T, Error>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| Error::MalformedResponse {
            endpoint,
            message: e.to_string(),
        })
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
