//! Shared fixtures for tests that talk to a mock device API.
//!
//! ```rust,ignore
//! let mut server = mockito::Server::new_async().await;
//! let fixture = Fixture::new(&server);
//! let _login = mock_login(&mut server, "access-1", "refresh-1", FAR_EXPIRY)
//!     .create_async()
//!     .await;
//! let session = fixture.session().await.unwrap();
//! ```

use std::sync::Arc;

use chrono::DateTime;
use mockito::{Matcher, Mock, Server};
use tempfile::TempDir;

use crate::api::{LOGIN_PATH, REFRESH_PATH};
use crate::clock::ManualClock;
use crate::config::{Credentials, DeviceConfig, FrameModel};
use crate::error::Result;
use crate::session::Session;
use crate::store::{CredentialStore, PersistedState};

/// Manual clock start (Unix seconds)
pub const START: i64 = 1_800_000_000;

/// An expiry well outside the refresh buffer
pub const FAR_EXPIRY: i64 = START + 30 * 24 * 3600;

pub const CACHED_DEVICE_ID: &str = "cached-device";

pub const FRAME_ID: &str = "0d4f5e6a-1111-4222-8333-444455556666";

/// Temp state directory, manual clock, and config pointing at a mock server.
pub struct Fixture {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub base_url: String,
}

impl Fixture {
    pub fn new(server: &Server) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            clock: ManualClock::at_timestamp(START),
            base_url: server.url(),
        }
    }

    pub fn config(&self) -> DeviceConfig {
        DeviceConfig::new(
            Credentials::Account {
                email: "me@example.com".to_string(),
                password: "pw".to_string(),
            },
            FRAME_ID,
            FrameModel::Portrait7,
        )
        .with_client_secret("test-secret")
        .with_base_url(&self.base_url)
        .with_state_path(self.dir.path().join("session.json"))
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(self.dir.path().join("session.json"))
    }

    pub async fn seed_cache(&self, access_token: &str, expires_at: i64) {
        self.store()
            .save(&PersistedState {
                device_id: CACHED_DEVICE_ID.to_string(),
                access_token: access_token.to_string(),
                refresh_token: "cached-refresh".to_string(),
                expires_at: DateTime::from_timestamp(expires_at, 0).unwrap(),
            })
            .await
            .unwrap();
    }

    pub async fn session(&self) -> Result<Session> {
        self.session_with(self.config()).await
    }

    pub async fn session_with(&self, config: DeviceConfig) -> Result<Session> {
        Session::create_with(config, Arc::new(self.clock.clone()), reqwest::Client::new()).await
    }
}

/// Successful login returning a full token grant (bare body).
pub fn mock_login(server: &mut Server, access: &str, refresh: &str, expires_at: i64) -> Mock {
    server
        .mock("POST", LOGIN_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "accessToken": access,
                "refreshToken": refresh,
                "expiresAt": expires_at,
            })
            .to_string(),
        )
}

/// Successful refresh without a new refresh token (wrapped body).
pub fn mock_refresh(server: &mut Server, access: &str, expires_at: i64) -> Mock {
    server
        .mock("POST", REFRESH_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "data": {
                    "accessToken": access,
                    "expiresAt": expires_at,
                }
            })
            .to_string(),
        )
}

/// Session that is already logged in as `access-1`.
pub async fn logged_in(server: &mut Server, fixture: &Fixture) -> Session {
    let login = mock_login(server, "access-1", "refresh-1", FAR_EXPIRY)
        .create_async()
        .await;
    let session = fixture.session().await.unwrap();
    login.remove_async().await;
    session
}
