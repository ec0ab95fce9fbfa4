//! Push a local image to a frame.
//!
//! Run with:
//! ```sh
//! INKFRAME_EMAIL=me@example.com INKFRAME_PASSWORD=... INKFRAME_CLIENT_SECRET=... \
//! INKFRAME_FRAME_ID=... INKFRAME_FRAME_MODEL=13.3 \
//!     cargo run --example upload_image -- picture.png
//! ```
//!
//! Whole uploads are retried a fixed number of times with a flat delay.

use std::time::Duration;

use inkframe::{upload_and_poll, DeviceConfig, Error, Session, UploadOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(10);

async fn attempt(session: &Session, image: &[u8]) -> Result<UploadOutcome, Error> {
    let mut outcome = upload_and_poll(session, image).await?;
    outcome.poll = outcome.poll.into_converted()?;
    Ok(outcome)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkframe=info,upload_image=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| Error::Config("usage: upload_image <image-file>".to_string()))?;
    let image = std::fs::read(&path)?;

    let config = DeviceConfig::from_env()?;
    let session = Session::create(config).await?;

    let mut last_error = None;
    for n in 1..=MAX_ATTEMPTS {
        match attempt(&session, &image).await {
            Ok(outcome) => {
                tracing::info!(
                    "Frame updated ({}x{}, {} polls, status '{}')",
                    outcome.resize.target.0,
                    outcome.resize.target.1,
                    outcome.poll.attempts,
                    outcome.poll.final_response.status
                );
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Upload attempt {}/{} failed: {}", n, MAX_ATTEMPTS, e);
                if e.is_auth() {
                    if let Err(e) = session.force_reauthenticate().await {
                        tracing::warn!("Re-authentication failed: {}", e);
                    }
                }
                last_error = Some(e);
                if n < MAX_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Config("no upload attempts made".to_string())))
}
