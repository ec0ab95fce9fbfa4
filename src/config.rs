//! Static device configuration, read once at startup.
//!
//! # Example (YAML)
//!
//! ```yaml
//! email: "me@example.com"
//! password: "hunter2"
//! client_secret: "signing-secret"
//! frame_id: "3f1b2c4d-0000-4000-8000-0123456789ab"
//! frame_model: "13.3"
//! rotate: 90
//! state_path: "state/session.json"
//! ```
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `INKFRAME_EMAIL` / `INKFRAME_PASSWORD` | Account login |
//! | `INKFRAME_TOKEN` | Long-lived bearer token (instead of email/password) |
//! | `INKFRAME_CLIENT_SECRET` | Login signing secret |
//! | `INKFRAME_FRAME_ID` | Target frame UUID |
//! | `INKFRAME_FRAME_MODEL` | `13.3`, `10.3` or `7.3` |
//! | `INKFRAME_ROTATE` | `0`, `90`, `180` or `270` (optional) |
//! | `INKFRAME_BASE_URL` | API host override (optional) |
//! | `INKFRAME_STATE_PATH` | Persisted session file (optional) |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{API_BASE_URL, DEFAULT_CLIENT_ID, DEFAULT_REFRESH_BUFFER_SECS, DEFAULT_STATE_FILE};

/// Hardware class of a frame. Determines the exact resolution it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FrameModel {
    /// 13.3" panel, landscape
    Landscape13,
    /// 10.3" panel, portrait
    Portrait10,
    /// 7.3" panel, portrait
    Portrait7,
}

impl FrameModel {
    /// All known models.
    pub const ALL: [FrameModel; 3] = [
        FrameModel::Landscape13,
        FrameModel::Portrait10,
        FrameModel::Portrait7,
    ];

    /// Target `(width, height)` in pixels.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            FrameModel::Landscape13 => (1600, 1200),
            FrameModel::Portrait10 => (1200, 1600),
            FrameModel::Portrait7 => (480, 800),
        }
    }

    /// Short identifier, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            FrameModel::Landscape13 => "13.3",
            FrameModel::Portrait10 => "10.3",
            FrameModel::Portrait7 => "7.3",
        }
    }
}

impl fmt::Display for FrameModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "13.3" | "landscape-13" | "landscape13" => Ok(FrameModel::Landscape13),
            "10.3" | "portrait-10" | "portrait10" => Ok(FrameModel::Portrait10),
            "7.3" | "portrait-7" | "portrait7" => Ok(FrameModel::Portrait7),
            other => Err(Error::Config(format!("Unknown frame model '{}'", other))),
        }
    }
}

impl TryFrom<String> for FrameModel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameModel> for String {
    fn from(model: FrameModel) -> Self {
        model.as_str().to_string()
    }
}

/// Fixed rotation applied before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Rotation in clockwise degrees.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = Error;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(Error::Config(format!(
                "Rotation must be 0, 90, 180 or 270 (got {})",
                other
            ))),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// How the client authenticates against the device API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Email/password login with refreshable tokens
    Account { email: String, password: String },
    /// Long-lived bearer token; login and refresh are never called
    Bearer(String),
}

// Keeps secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Account { email, .. } => f
                .debug_struct("Account")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Fixed protocol values of the device API.
#[derive(Clone)]
pub struct ApiProfile {
    /// API host, without trailing slash
    pub base_url: String,
    /// Value of the client-id header and the signed login message prefix
    pub client_id: String,
    /// HMAC key for signing the login URL
    pub client_secret: String,
    /// Value of the country header
    pub country: String,
    /// Value of the language header
    pub language: String,
    /// Extra headers the convert endpoint requires
    pub upload_headers: Vec<(String, String)>,
}

impl Default for ApiProfile {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: String::new(),
            country: "US".to_string(),
            language: "en".to_string(),
            upload_headers: vec![
                ("x-header-uploadtype".to_string(), "frame".to_string()),
                ("x-header-convert".to_string(), "1".to_string()),
            ],
        }
    }
}

impl fmt::Debug for ApiProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiProfile")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("country", &self.country)
            .field("language", &self.language)
            .field("upload_headers", &self.upload_headers)
            .finish()
    }
}

/// Everything the client needs to know about the account and the target frame.
///
/// # Example
///
/// ```
/// use inkframe::{Credentials, DeviceConfig, FrameModel, Rotation};
///
/// let config = DeviceConfig::new(
///     Credentials::Account {
///         email: "me@example.com".into(),
///         password: "secret".into(),
///     },
///     "3f1b2c4d-0000-4000-8000-0123456789ab",
///     FrameModel::Portrait10,
/// )
/// .with_rotation(Rotation::Cw90)
/// .with_client_secret("signing-secret");
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.frame_model.resolution(), (1200, 1600));
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub credentials: Credentials,
    /// Target frame identifier (UUID)
    pub frame_id: String,
    pub frame_model: FrameModel,
    pub rotation: Rotation,
    pub api: ApiProfile,
    /// Where the session cache is persisted
    pub state_path: PathBuf,
    /// Refresh proactively once `now >= expiry - refresh_buffer`
    pub refresh_buffer: Duration,
}

impl DeviceConfig {
    /// Create a config with default API profile, no rotation and a 1 hour
    /// refresh buffer.
    pub fn new(
        credentials: Credentials,
        frame_id: impl Into<String>,
        frame_model: FrameModel,
    ) -> Self {
        Self {
            credentials,
            frame_id: frame_id.into(),
            frame_model,
            rotation: Rotation::None,
            api: ApiProfile::default(),
            state_path: PathBuf::from(DEFAULT_STATE_FILE),
            refresh_buffer: Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS),
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the login signing secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.api.client_secret = secret.into();
        self
    }

    /// Set a custom API host (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Check the invariants that can't be expressed by the types alone.
    pub fn validate(&self) -> Result<(), Error> {
        if self.frame_id.trim().is_empty() {
            return Err(Error::Config("frame_id must not be empty".to_string()));
        }
        match &self.credentials {
            Credentials::Account { email, password } => {
                if email.trim().is_empty() || password.is_empty() {
                    return Err(Error::Config(
                        "email and password must not be empty".to_string(),
                    ));
                }
                if self.api.client_secret.is_empty() {
                    return Err(Error::Config(
                        "client_secret is required for account login".to_string(),
                    ));
                }
            }
            Credentials::Bearer(token) => {
                if token.trim().is_empty() {
                    return Err(Error::Config("token must not be empty".to_string()));
                }
            }
        }
        if self.api.base_url.is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build a config from `INKFRAME_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = RawConfig {
            email: lookup("INKFRAME_EMAIL"),
            password: lookup("INKFRAME_PASSWORD"),
            token: lookup("INKFRAME_TOKEN"),
            client_secret: lookup("INKFRAME_CLIENT_SECRET"),
            frame_id: lookup("INKFRAME_FRAME_ID")
                .ok_or_else(|| Error::Config("INKFRAME_FRAME_ID is not set".to_string()))?,
            frame_model: lookup("INKFRAME_FRAME_MODEL")
                .ok_or_else(|| Error::Config("INKFRAME_FRAME_MODEL is not set".to_string()))?
                .parse()?,
            rotate: lookup("INKFRAME_ROTATE")
                .map(|v| {
                    v.trim().parse::<u16>().map_err(|_| {
                        Error::Config(format!("INKFRAME_ROTATE is not a number: '{}'", v))
                    })
                })
                .transpose()?
                .map(Rotation::try_from)
                .transpose()?
                .unwrap_or_default(),
            base_url: lookup("INKFRAME_BASE_URL"),
            state_path: lookup("INKFRAME_STATE_PATH").map(PathBuf::from),
            refresh_buffer_secs: None,
        };
        raw.into_config()
    }

    /// Load a config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let raw: RawConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))?;
        raw.into_config()
    }
}

/// Flat on-disk/env shape, converted into [`DeviceConfig`] after validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    frame_id: String,
    frame_model: FrameModel,
    #[serde(default)]
    rotate: Rotation,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    state_path: Option<PathBuf>,
    #[serde(default)]
    refresh_buffer_secs: Option<u64>,
}

impl RawConfig {
    fn into_config(self) -> Result<DeviceConfig, Error> {
        let credentials = match (self.email, self.password, self.token) {
            (Some(email), Some(password), _) => Credentials::Account { email, password },
            (None, None, Some(token)) => Credentials::Bearer(token),
            (Some(_), None, _) | (None, Some(_), _) => {
                return Err(Error::Config(
                    "email and password must be given together".to_string(),
                ))
            }
            (None, None, None) => {
                return Err(Error::Config(
                    "either email/password or token is required".to_string(),
                ))
            }
        };

        let mut config = DeviceConfig::new(credentials, self.frame_id, self.frame_model)
            .with_rotation(self.rotate);
        if let Some(secret) = self.client_secret {
            config = config.with_client_secret(secret);
        }
        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(path) = self.state_path {
            config = config.with_state_path(path);
        }
        if let Some(secs) = self.refresh_buffer_secs {
            config = config.with_refresh_buffer(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_frame_model_table() {
        assert_eq!(FrameModel::Landscape13.resolution(), (1600, 1200));
        assert_eq!(FrameModel::Portrait10.resolution(), (1200, 1600));
        assert_eq!(FrameModel::Portrait7.resolution(), (480, 800));

        let landscape = FrameModel::ALL
            .iter()
            .filter(|m| {
                let (w, h) = m.resolution();
                w > h
            })
            .count();
        assert_eq!(landscape, 1);
    }

    #[test]
    fn test_frame_model_parse() {
        assert_eq!("13.3".parse::<FrameModel>().unwrap(), FrameModel::Landscape13);
        assert_eq!(
            "Portrait-7".parse::<FrameModel>().unwrap(),
            FrameModel::Portrait7
        );
        assert!("42".parse::<FrameModel>().is_err());
    }

    #[test]
    fn test_rotation_bounds() {
        assert_eq!(Rotation::try_from(270).unwrap(), Rotation::Cw270);
        assert_eq!(Rotation::try_from(0).unwrap(), Rotation::None);
        assert!(matches!(Rotation::try_from(45), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
email: "me@example.com"
password: "pw"
client_secret: "s3cret"
frame_id: "frame-1"
frame_model: "10.3"
rotate: 180
base_url: "http://localhost:9000/"
refresh_buffer_secs: 600
"#;
        let config = DeviceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.frame_model, FrameModel::Portrait10);
        assert_eq!(config.rotation, Rotation::Cw180);
        assert_eq!(config.api.base_url, "http://localhost:9000");
        assert_eq!(config.refresh_buffer, Duration::from_secs(600));
        assert_eq!(config.state_path, PathBuf::from(DEFAULT_STATE_FILE));
    }

    #[test]
    fn test_from_yaml_rejects_bad_rotation() {
        let yaml = r#"
token: "abc"
frame_id: "frame-1"
frame_model: "7.3"
rotate: 45
"#;
        assert!(matches!(
            DeviceConfig::from_yaml(yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_lookup_bearer() {
        let env: HashMap<&str, &str> = [
            ("INKFRAME_TOKEN", "long-lived"),
            ("INKFRAME_FRAME_ID", "frame-1"),
            ("INKFRAME_FRAME_MODEL", "13.3"),
            ("INKFRAME_ROTATE", "90"),
        ]
        .into_iter()
        .collect();

        let config = DeviceConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.credentials, Credentials::Bearer("long-lived".to_string()));
        assert_eq!(config.rotation, Rotation::Cw90);
    }

    #[test]
    fn test_from_lookup_requires_secret_for_account() {
        let env: HashMap<&str, &str> = [
            ("INKFRAME_EMAIL", "me@example.com"),
            ("INKFRAME_PASSWORD", "pw"),
            ("INKFRAME_FRAME_ID", "frame-1"),
            ("INKFRAME_FRAME_MODEL", "13.3"),
        ]
        .into_iter()
        .collect();

        let err = DeviceConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::Account {
            email: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
