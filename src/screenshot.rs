//! Placeholder pictures for records that found none.
//!
//! The placeholder URL is stored on the record right away; capturing the
//! image is left to whoever drains the queue.

use crate::utils::parameterize;
use crate::MediaError;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotJob {
    /// Page to capture.
    pub url: String,
    /// Where the capture is expected to end up.
    pub picture: String,
}

/// `{base}/screenshots/{parameterized url}.png`
pub fn placeholder_url(base_url: &str, url: &str) -> String {
    format!(
        "{}/screenshots/{}.png",
        base_url.trim_end_matches('/'),
        parameterize(url)
    )
}

pub trait ScreenshotQueue: Send + Sync {
    fn enqueue(&self, job: ScreenshotJob) -> Result<(), MediaError>;
}

/// Drops jobs. Used when no capture backend is wired in.
#[derive(Debug, Default, Clone)]
pub struct NoopScreenshotQueue;

impl ScreenshotQueue for NoopScreenshotQueue {
    fn enqueue(&self, job: ScreenshotJob) -> Result<(), MediaError> {
        debug!(url = %job.url, "No screenshot backend, dropping job");
        Ok(())
    }
}

/// Hands jobs to the host application over a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelScreenshotQueue {
    sender: mpsc::UnboundedSender<ScreenshotJob>,
}

impl ChannelScreenshotQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScreenshotJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ScreenshotQueue for ChannelScreenshotQueue {
    fn enqueue(&self, job: ScreenshotJob) -> Result<(), MediaError> {
        debug!(url = %job.url, picture = %job.picture, "Scheduling screenshot");
        self.sender
            .send(job)
            .map_err(|e| MediaError::ExternalServiceError {
                service: "screenshot".to_string(),
                message: format!("screenshot receiver dropped: {}", e.0.url),
            })
    }
}
