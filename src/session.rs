//! Authenticated session against the device API.
//!
//! A [`Session`] is created once per process and shared (behind an `Arc`) by
//! everything that talks to the device. It owns the token state and is the
//! only thing that mutates it.
//!
//! # Lifecycle
//!
//! 1. [`Session::create`] tries the on-disk cache first. A cached token that
//!    has not expired is adopted (and refreshed right away if it is already
//!    inside the refresh buffer); otherwise the client logs in, reusing the
//!    cached device id when there is one.
//! 2. Every request goes through [`Session::fetch_with_auth`], which refreshes
//!    proactively once `now >= expires_at - refresh_buffer` and reacts to a
//!    single 401 with one refresh-or-login cycle and one retry.
//! 3. Refresh is always tried before login. Login failures propagate.
//!
//! # Coalescing
//!
//! Re-authentication runs under one async mutex. Each caller records the
//! settle generation it observed before deciding it needs new tokens; if the
//! generation has moved on by the time it gets the lock, someone else already
//! did the work and the caller adopts that outcome (success or failure)
//! instead of calling the API again. Token fields are written only while
//! holding that mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{
    self, AuthTokens, LoginRequest, RefreshRequest, HEADER_CLIENT_ID, HEADER_COUNTRY,
    HEADER_DEVICE_ID, HEADER_LANGUAGE, LOGIN_PATH, REFRESH_PATH,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{Credentials, DeviceConfig};
use crate::error::{Error, Result};
use crate::signing;
use crate::store::{CredentialStore, PersistedState};
use crate::DEFAULT_TIMEOUT_SECS;

/// Live token state. Only written while holding the settle lock.
#[derive(Clone)]
struct SessionState {
    device_id: String,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl SessionState {
    fn unauthenticated(device_id: String) -> Self {
        Self {
            device_id,
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: DateTime::<Utc>::default(),
        }
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            device_id: self.device_id.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl From<PersistedState> for SessionState {
    fn from(p: PersistedState) -> Self {
        Self {
            device_id: p.device_id,
            access_token: p.access_token,
            refresh_token: p.refresh_token,
            expires_at: p.expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAction {
    RefreshOrLogin,
    Login,
}

#[derive(Default)]
struct SettleLedger {
    last_outcome: Option<Result<()>>,
}

/// Authenticated client for the device API.
///
/// # Example
///
/// ```rust,no_run
/// use inkframe::{DeviceConfig, Session};
///
/// # async fn example() -> Result<(), inkframe::Error> {
/// let config = DeviceConfig::from_env()?;
/// let session = Session::create(config).await?;
///
/// let response = session
///     .fetch_with_auth(
///         reqwest::Method::POST,
///         &session.url("/api/v1/item/is-converted"),
///         |req| req.json(&serde_json::json!({ "queueId": "42" })),
///     )
///     .await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: DeviceConfig,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    store: CredentialStore,
    state: RwLock<SessionState>,
    generation: AtomicU64,
    settle_lock: Mutex<SettleLedger>,
}

impl Session {
    /// Create a session with the system clock and a default HTTP client.
    pub async fn create(config: DeviceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::create_with(config, Arc::new(SystemClock), http).await
    }

    /// Create a session with an explicit clock and HTTP client.
    pub async fn create_with(
        config: DeviceConfig,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;
        let store = CredentialStore::new(&config.state_path);
        let cached = store.load().await;
        let now = clock.now();

        let (state, action) = match &config.credentials {
            Credentials::Bearer(token) => {
                let device_id = cached
                    .map(|p| p.device_id)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let state = SessionState {
                    device_id,
                    access_token: token.clone(),
                    refresh_token: String::new(),
                    expires_at: DateTime::<Utc>::MAX_UTC,
                };
                (state, None)
            }
            Credentials::Account { .. } => match cached {
                Some(p) if p.expires_at > now => {
                    let stale = within_buffer(p.expires_at, config.refresh_buffer, now);
                    tracing::info!(
                        "Restored session for device {} (expires {})",
                        p.device_id,
                        p.expires_at
                    );
                    (p.into(), stale.then_some(AuthAction::RefreshOrLogin))
                }
                Some(p) => {
                    tracing::info!("Cached session expired at {}, logging in", p.expires_at);
                    (
                        SessionState::unauthenticated(p.device_id),
                        Some(AuthAction::Login),
                    )
                }
                None => {
                    let device_id = Uuid::new_v4().to_string();
                    tracing::info!("No cached session, logging in as new device {}", device_id);
                    (
                        SessionState::unauthenticated(device_id),
                        Some(AuthAction::Login),
                    )
                }
            },
        };

        let session = Self {
            config,
            http,
            clock,
            store,
            state: RwLock::new(state),
            generation: AtomicU64::new(0),
            settle_lock: Mutex::new(SettleLedger::default()),
        };

        match action {
            Some(action) => session.settle(0, action).await?,
            None if matches!(session.config.credentials, Credentials::Bearer(_)) => {
                session.persist().await;
            }
            None => {}
        }
        Ok(session)
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Device identifier sent with every request.
    pub fn device_id(&self) -> String {
        self.snapshot().device_id
    }

    /// Expiry of the current access token.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.snapshot().expires_at
    }

    /// Whether the access token is inside the refresh buffer (or past expiry).
    pub fn is_stale(&self) -> bool {
        within_buffer(
            self.snapshot().expires_at,
            self.config.refresh_buffer,
            self.clock.now(),
        )
    }

    /// Clock used for expiry checks and poll timing.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api.base_url, path)
    }

    /// Send an authenticated request.
    ///
    /// `build` receives a request that already carries the method, URL and
    /// auth headers, and attaches the body. It may be called twice (after a
    /// 401), so it must be able to produce the same body again.
    ///
    /// # Errors
    ///
    /// - Re-authentication failed ([`Error::Login`], [`Error::Refresh`])
    /// - The retried request was rejected with 401 again ([`Error::Unauthorized`])
    /// - Transport failure ([`Error::Request`])
    ///
    /// Other non-2xx statuses are returned as a normal response.
    pub async fn fetch_with_auth<F>(
        &self,
        method: Method,
        url: &str,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let observed = self.generation.load(Ordering::Acquire);
        if self.is_stale() {
            tracing::debug!("Access token is within the refresh buffer, refreshing first");
            self.settle(observed, AuthAction::RefreshOrLogin).await?;
        }

        let observed = self.generation.load(Ordering::Acquire);
        let response = self.send(&method, url, &build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::warn!("{} {} returned 401, re-authenticating once", method, url);
        self.settle(observed, AuthAction::RefreshOrLogin).await?;

        let retry = self.send(&method, url, &build).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            let body = match retry.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("Could not read body of repeated 401: {}", e);
                    String::new()
                }
            };
            return Err(Error::Unauthorized { body });
        }
        Ok(retry)
    }

    /// Run one coalesced refresh-or-login cycle regardless of token age.
    pub async fn force_reauthenticate(&self) -> Result<()> {
        let observed = self.generation.load(Ordering::Acquire);
        self.settle(observed, AuthAction::RefreshOrLogin).await
    }

    async fn send<F>(&self, method: &Method, url: &str, build: &F) -> Result<reqwest::Response>
    where
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let headers = self.auth_headers(&self.snapshot())?;
        let request = build(self.http.request(method.clone(), url).headers(headers));
        Ok(request.send().await?)
    }

    /// Serialize re-authentication. See the module docs.
    async fn settle(&self, observed: u64, action: AuthAction) -> Result<()> {
        let mut ledger = self.settle_lock.lock().await;

        let current = self.generation.load(Ordering::Acquire);
        if current != observed {
            tracing::debug!("Re-authentication already settled by a concurrent caller");
            return ledger.last_outcome.clone().unwrap_or(Ok(()));
        }

        let outcome = match action {
            AuthAction::RefreshOrLogin => self.refresh_or_login().await,
            AuthAction::Login => self.login().await,
        };

        ledger.last_outcome = Some(outcome.clone());
        self.generation.store(current + 1, Ordering::Release);
        outcome
    }

    async fn refresh_or_login(&self) -> Result<()> {
        if let Credentials::Bearer(_) = self.config.credentials {
            return Err(Error::Unauthorized {
                body: "bearer token rejected and cannot be refreshed".to_string(),
            });
        }

        if self.snapshot().refresh_token.is_empty() {
            return self.login().await;
        }

        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Token refresh failed, falling back to login: {}", e);
                self.login().await
            }
        }
    }

    async fn login(&self) -> Result<()> {
        let Credentials::Account { email, password } = &self.config.credentials else {
            return Err(Error::Config(
                "login requires account credentials".to_string(),
            ));
        };

        let state = self.snapshot();
        let profile = &self.config.api;
        let url = signing::signed_url(
            &self.url(LOGIN_PATH),
            &profile.client_secret,
            &profile.client_id,
            self.clock.now().timestamp_millis(),
        );

        let response = self
            .http
            .post(&url)
            .headers(self.base_headers(&state.device_id)?)
            .json(&LoginRequest {
                email,
                password,
                device_id: &state.device_id,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Login {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: AuthTokens = api::parse_body(LOGIN_PATH, &body)?;
        self.apply_auth_response(LOGIN_PATH, tokens).await?;
        tracing::info!("Logged in as device {}", state.device_id);
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let state = self.snapshot();

        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .headers(self.auth_headers(&state)?)
            .json(&RefreshRequest {
                device_id: &state.device_id,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Refresh {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: AuthTokens = api::parse_body(REFRESH_PATH, &body)?;
        self.apply_auth_response(REFRESH_PATH, tokens).await?;
        tracing::info!("Refreshed access token");
        Ok(())
    }

    /// Replace the token fields with a server grant and persist them.
    async fn apply_auth_response(&self, endpoint: &'static str, tokens: AuthTokens) -> Result<()> {
        let expires_at = DateTime::from_timestamp(tokens.expires_at, 0).ok_or_else(|| {
            Error::MalformedResponse {
                endpoint,
                message: format!("expiresAt out of range: {}", tokens.expires_at),
            }
        })?;

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.access_token = tokens.access_token;
            if let Some(refresh_token) = tokens.refresh_token {
                state.refresh_token = refresh_token;
            }
            state.expires_at = expires_at;
        }
        tracing::debug!("Access token now expires at {}", expires_at);

        self.persist().await;
        Ok(())
    }

    async fn persist(&self) {
        let persisted = self.snapshot().persisted();
        if let Err(e) = self.store.save(&persisted).await {
            tracing::warn!("Failed to persist session: {}", e);
        }
    }

    fn snapshot(&self) -> SessionState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn base_headers(&self, device_id: &str) -> Result<HeaderMap> {
        let profile = &self.config.api;
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, HEADER_COUNTRY, &profile.country)?;
        insert_header(&mut headers, HEADER_LANGUAGE, &profile.language)?;
        insert_header(&mut headers, HEADER_CLIENT_ID, &profile.client_id)?;
        insert_header(&mut headers, HEADER_DEVICE_ID, device_id)?;
        Ok(headers)
    }

    fn auth_headers(&self, state: &SessionState) -> Result<HeaderMap> {
        let mut headers = self.base_headers(&state.device_id)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", state.access_token))
            .map_err(|_| Error::Config("Access token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("Session")
            .field("device_id", &state.device_id)
            .field("expires_at", &state.expires_at)
            .field("frame_id", &self.config.frame_id)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// `now >= expires_at - buffer`, treating underflow as stale.
fn within_buffer(expires_at: DateTime<Utc>, buffer: Duration, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(buffer)
        .ok()
        .and_then(|buffer| expires_at.checked_sub_signed(buffer))
        .map_or(true, |threshold| threshold <= now)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::Config(format!("Invalid header name '{}'", name)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::Config(format!("Invalid value for header '{}'", name)))?;
    headers.insert(name, value);
    Ok(())
}
