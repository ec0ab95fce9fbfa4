//! Image submission and conversion tracking.
//!
//! Uploading is a two-step protocol: the convert endpoint accepts the image
//! and returns a queue job id, and the status endpoint is then polled until
//! the job leaves the `"pending"` state.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Method;

use crate::api::{
    self, ConversionStatus, ConvertResponse, IsConvertedRequest, CONVERT_PATH, IS_CONVERTED_PATH,
};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transform::{resize_for_frame, ResizeResult};

/// Delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Give up polling after this long
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Polling cadence for [`poll_is_converted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep between a pending response and the next poll
    pub interval: Duration,
    /// Stop polling once this much time has passed
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Record of one polling sequence.
///
/// A timeout is not an error: `final_response.status` is simply still
/// `"pending"`. Check [`PollResult::timed_out`].
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Server queue job id
    pub queue_id: String,
    /// Number of status requests made
    pub attempts: u32,
    /// Clock time from the first poll until the loop returned
    pub elapsed: Duration,
    /// Last status the server reported
    pub final_response: ConversionStatus,
}

impl PollResult {
    /// Whether polling stopped while the job was still pending.
    pub fn timed_out(&self) -> bool {
        self.final_response.is_pending()
    }

    /// Treat a timed-out poll as a failure.
    ///
    /// # Errors
    ///
    /// [`Error::PollTimeout`] if the job was still pending.
    pub fn into_converted(self) -> Result<Self> {
        if self.timed_out() {
            return Err(Error::PollTimeout {
                queue_id: self.queue_id,
                elapsed: self.elapsed,
            });
        }
        Ok(self)
    }
}

/// Everything produced by [`upload_and_poll`].
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub resize: ResizeResult,
    pub convert: ConvertResponse,
    pub poll: PollResult,
}

impl UploadOutcome {
    /// Whether the server finished the job (in any terminal state).
    pub fn is_converted(&self) -> bool {
        !self.poll.timed_out()
    }
}

/// Upload filename for a media type.
///
/// ```
/// use inkframe::filename_for_media_type;
///
/// assert_eq!(filename_for_media_type("image/png"), "image.png");
/// assert_eq!(filename_for_media_type("image/webp"), "image.webp");
/// assert_eq!(filename_for_media_type("image/jpeg"), "image.jpg");
/// assert_eq!(filename_for_media_type("application/octet-stream"), "image.jpg");
/// ```
pub fn filename_for_media_type(media_type: &str) -> &'static str {
    match media_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => "image.png",
        "image/webp" => "image.webp",
        _ => "image.jpg",
    }
}

/// Submit an image to the configured frame.
///
/// The multipart body has exactly two parts: `frames[]` (the frame id) and
/// `file` (the image bytes).
///
/// # Errors
///
/// [`Error::Upload`] on a non-2xx response, plus any error from
/// [`Session::fetch_with_auth`].
pub async fn upload_convert(
    session: &Session,
    bytes: &[u8],
    media_type: &str,
) -> Result<ConvertResponse> {
    let filename = filename_for_media_type(media_type);
    let frame_id = session.config().frame_id.clone();
    let upload_headers = session.config().api.upload_headers.clone();

    tracing::info!(
        "Uploading {} bytes ({}) to frame {}",
        bytes.len(),
        media_type,
        frame_id
    );

    let response = session
        .fetch_with_auth(Method::POST, &session.url(CONVERT_PATH), |req| {
            // Rebuilt on every attempt; multipart forms are single-use
            let form = Form::new()
                .text("frames[]", frame_id.clone())
                .part("file", Part::bytes(bytes.to_vec()).file_name(filename));
            upload_headers
                .iter()
                .fold(req, |req, (name, value)| req.header(name.as_str(), value.as_str()))
                .multipart(form)
        })
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::Upload {
            status: status.as_u16(),
            body,
        });
    }

    let convert: ConvertResponse = api::parse_body(CONVERT_PATH, &body)?;
    tracing::info!("Upload accepted, queue job {}", convert.queue_id);
    Ok(convert)
}

/// Poll the status endpoint until the job is no longer pending or the
/// timeout elapses.
///
/// Polls are strictly sequential. The timeout is checked between polls; an
/// in-flight request is never aborted.
///
/// # Errors
///
/// [`Error::Poll`] as soon as any single poll returns non-2xx.
pub async fn poll_is_converted(
    session: &Session,
    queue_id: &str,
    settings: PollSettings,
) -> Result<PollResult> {
    let clock = session.clock();
    let url = session.url(IS_CONVERTED_PATH);
    let started = clock.now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let response = session
            .fetch_with_auth(Method::POST, &url, |req| {
                req.json(&IsConvertedRequest { queue_id })
            })
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Poll {
                status: status.as_u16(),
                body,
            });
        }

        let report: ConversionStatus = api::parse_body(IS_CONVERTED_PATH, &body)?;
        tracing::debug!(
            "Queue job {} attempt {}: {}",
            queue_id,
            attempts,
            report.status
        );

        let finished = !report.is_pending();
        if !finished {
            clock.sleep(settings.interval).await;
        }

        let elapsed = (clock.now() - started).to_std().unwrap_or_default();
        if finished || elapsed >= settings.timeout {
            if finished {
                tracing::info!(
                    "Queue job {} finished with status '{}' after {} attempts",
                    queue_id,
                    report.status,
                    attempts
                );
            } else {
                tracing::warn!(
                    "Queue job {} still pending after {:?} ({} attempts)",
                    queue_id,
                    elapsed,
                    attempts
                );
            }
            return Ok(PollResult {
                queue_id: queue_id.to_string(),
                attempts,
                elapsed,
                final_response: report,
            });
        }
    }
}

/// Transform, upload and poll with default poll settings.
pub async fn upload_and_poll(session: &Session, bytes: &[u8]) -> Result<UploadOutcome> {
    upload_and_poll_with(session, bytes, PollSettings::default()).await
}

/// Transform `bytes` for the configured frame, upload them and wait for the
/// conversion job.
pub async fn upload_and_poll_with(
    session: &Session,
    bytes: &[u8],
    settings: PollSettings,
) -> Result<UploadOutcome> {
    let config = session.config();
    let resize = resize_for_frame(bytes, config.frame_model, config.rotation)?;
    let convert = upload_convert(session, &resize.bytes, resize.media_type).await?;
    let poll = poll_is_converted(session, &convert.queue_id, settings).await?;

    Ok(UploadOutcome {
        resize,
        convert,
        poll,
    })
}
