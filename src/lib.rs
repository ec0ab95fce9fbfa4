//! # inkframe
//!
//! Client for cloud-connected e-ink picture frames whose vendor API has no
//! official client library.
//!
//! The crate covers the device-facing half of a "generate a picture, put it on
//! the wall" pipeline:
//! - An authenticated [`Session`] (signed login, token refresh, 401 retry,
//!   refresh coalescing, on-disk token cache)
//! - An image pipeline that fits any image to the panel's exact resolution
//! - Upload of the result and polling of the server-side conversion job
//!
//! Deciding *what* to draw, and retrying whole failed uploads, is left to the
//! caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inkframe::{upload_and_poll, DeviceConfig, Session};
//!
//! # async fn example() -> Result<(), inkframe::Error> {
//! let config = DeviceConfig::from_env()?;
//! let session = Session::create(config).await?;
//!
//! let image = std::fs::read("picture.png")?;
//! let outcome = upload_and_poll(&session, &image).await?;
//!
//! if outcome.is_converted() {
//!     println!("Frame updated: {}", outcome.poll.final_response.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Frame Models
//!
//! | Model | Resolution |
//! |-------|------------|
//! | `13.3` | 1600x1200 (landscape) |
//! | `10.3` | 1200x1600 (portrait) |
//! | `7.3` | 480x800 (portrait) |
//!
//! Images are scaled to cover the panel, center-cropped, and delivered as JPEG.
//!
//! ## Device API
//!
//! | Endpoint | Method | Auth |
//! |----------|--------|------|
//! | `/api/v1/auth/login` | POST | Signed query (`timestamp`, `signature`) |
//! | `/api/v1/auth/refresh-token` | POST | Bearer |
//! | `/api/v1/item/convert` | POST | Bearer, multipart |
//! | `/api/v1/item/is-converted` | POST | Bearer |

pub mod api;
pub mod clock;
pub mod config;
mod error;
pub mod session;
pub mod signing;
pub mod store;
pub mod transform;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use api::{ConversionStatus, ConvertResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiProfile, Credentials, DeviceConfig, FrameModel, Rotation};
pub use error::{Error, Result};
pub use session::Session;
pub use store::{CredentialStore, PersistedState};
pub use transform::{resize_for_frame, ResizeResult, DELIVERY_MEDIA_TYPE};
pub use upload::{
    filename_for_media_type, poll_is_converted, upload_and_poll, upload_and_poll_with,
    upload_convert, PollResult, PollSettings, UploadOutcome,
};

/// Device API host
pub const API_BASE_URL: &str = "https://api.inkframe.cloud";

/// Value of the client-id header and the prefix of the signed login message
pub const DEFAULT_CLIENT_ID: &str = "inkframe-web";

/// Per-request HTTP timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Refresh tokens this long before they expire
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 60 * 60;

/// Session cache filename, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = ".inkframe-session.json";
