//! The per-transfer state machine.
//!
//! One task owns one HTTP request, one cancellation token, one rate
//! estimator, and one sink, and publishes immutable snapshots into the
//! registry as it progresses. The only states are `downloading` and the
//! three terminal ones; a terminal snapshot is the task's last word.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{OTP_HEADER, PUBLISH_INTERVAL, SPEED_LIMIT_HEADER};
use super::error::DownloadError;
use super::manager::ProgressPublisher;
use super::rate::RateEstimator;
use super::sink::{OpenOutcome, TransferSink};
use crate::session::ServerSession;

/// Lifecycle state of one transfer. `Downloading` is the sole initial
/// state; the other three are terminal and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Error,
    Aborted,
}

impl DownloadStatus {
    /// Returns true once the state permits no further mutation.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

/// Point-in-time view of one transfer, published whole into the registry.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    /// Registry key.
    pub item_id: String,
    /// Display/destination name.
    pub filename: String,
    /// Bytes received so far; monotonically non-decreasing.
    pub received_bytes: u64,
    /// Declared length from the response, when the server sent one.
    pub total_bytes: Option<u64>,
    /// Derived; `None` while the total length is unknown.
    pub progress_percent: Option<f64>,
    /// Lifecycle state.
    pub status: DownloadStatus,
    /// Set only when `status` is `error`; suitable for direct display.
    pub error_message: Option<String>,
    /// Latest windowed throughput estimate, once one exists.
    pub speed_bps: Option<u64>,
    /// Unix epoch milliseconds at task start.
    pub started_at_ms: u64,
}

impl TaskSnapshot {
    pub(crate) fn new(item_id: &str, filename: &str) -> Self {
        let started_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            item_id: item_id.to_string(),
            filename: filename.to_string(),
            received_bytes: 0,
            total_bytes: None,
            progress_percent: None,
            status: DownloadStatus::Downloading,
            error_message: None,
            speed_bps: None,
            started_at_ms,
        }
    }

    /// Marks the transfer completed. The percentage only becomes 100 when
    /// a declared length exists; without one it stays undefined. (The
    /// token path sets the percentage explicitly before completing.)
    pub(crate) fn complete(&mut self) {
        self.status = DownloadStatus::Completed;
        if self.total_bytes.is_some() {
            self.progress_percent = Some(100.0);
        }
    }
}

/// How a one-time download token is redeemed: the host navigates to the
/// redeem address instead of this process streaming bytes.
pub trait Navigator: Send + Sync {
    /// Performs (or delegates) the navigation.
    fn navigate(&self, url: &str);
}

/// Default navigator: records the redeem address in the log so a host
/// shell or the user can follow it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, url: &str) {
        info!(url, "redeeming one-time download token via navigation");
    }
}

/// One in-flight transfer. Constructed and spawned by the manager.
pub(crate) struct DownloadTask {
    pub(crate) session: ServerSession,
    pub(crate) item_id: String,
    pub(crate) filename: String,
    /// Cap read once at start; changes never affect a transfer in flight.
    pub(crate) limit_kbps: u64,
    pub(crate) sink: Box<dyn TransferSink>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) cancel: CancellationToken,
    pub(crate) publisher: ProgressPublisher,
}

impl DownloadTask {
    /// Runs the transfer to a terminal state. Never returns an error: all
    /// failure is reported through the published snapshot.
    #[instrument(skip(self), fields(item_id = %self.item_id, filename = %self.filename))]
    pub(crate) async fn run(mut self) {
        let started = Instant::now();
        let mut snapshot = TaskSnapshot::new(&self.item_id, &self.filename);
        self.publisher.publish(&snapshot);

        match self.transfer(&mut snapshot, started).await {
            Ok(()) => {
                snapshot.complete();
                info!(bytes = snapshot.received_bytes, "download completed");
            }
            Err(e) if e.is_cancelled() => {
                self.sink.abort().await;
                snapshot.status = DownloadStatus::Aborted;
                info!(bytes = snapshot.received_bytes, "download aborted");
            }
            Err(e) => {
                self.sink.abort().await;
                snapshot.status = DownloadStatus::Error;
                snapshot.error_message = Some(e.to_string());
                warn!(error = %e, bytes = snapshot.received_bytes, "download failed");
            }
        }

        // The terminal transition is always published, throttling aside.
        self.publisher.publish(&snapshot);
    }

    async fn transfer(
        &mut self,
        snapshot: &mut TaskSnapshot,
        started: Instant,
    ) -> Result<(), DownloadError> {
        let url = self.session.download_url(&self.item_id);
        let request = self
            .session
            .get(&url)
            .header(SPEED_LIMIT_HEADER, self.limit_kbps.to_string());

        let response = tokio::select! {
            () = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(&url)
                } else {
                    DownloadError::network(&url, e)
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::request_failed(&url, status.as_u16()));
        }

        // A one-time token takes precedence over any body: the host
        // navigates to the redeem address and bytes are never observed by
        // this process, so received_bytes stays 0. The sink is never
        // opened on this path; navigation is the only side effect.
        if let Some(otp) = response
            .headers()
            .get(OTP_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let redeem_url = self.session.otp_redeem_url(otp);
            debug!(redeem_url = %redeem_url, "one-time token response");
            self.navigator.navigate(&redeem_url);
            snapshot.progress_percent = Some(100.0);
            return Ok(());
        }

        // Destination next: an unwritable target or a declined prompt
        // still resolves before any chunk is read.
        match self.sink.open(&self.filename).await? {
            OpenOutcome::Ready => {}
            OpenOutcome::Declined => return Err(DownloadError::Cancelled),
        }

        snapshot.total_bytes = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!(total_bytes = ?snapshot.total_bytes, "streaming response body");

        let mut stream = response.bytes_stream();
        let mut estimator = RateEstimator::new();
        let mut last_publish = Instant::now();

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk_result) = next else { break };
            let chunk = chunk_result.map_err(|e| DownloadError::network(&url, e))?;

            // The write completes, in order, before the next chunk is
            // requested; backpressure against the network is implicit.
            self.sink.write(&chunk).await?;

            snapshot.received_bytes += chunk.len() as u64;
            #[allow(clippy::cast_possible_truncation)]
            let now_ms = started.elapsed().as_millis() as u64;
            estimator.record(now_ms, snapshot.received_bytes);
            snapshot.speed_bps = estimator.estimate_bps(now_ms, snapshot.received_bytes);
            if let Some(total) = snapshot.total_bytes.filter(|t| *t > 0) {
                #[allow(clippy::cast_precision_loss)]
                let percent = 100.0 * snapshot.received_bytes as f64 / total as f64;
                snapshot.progress_percent = Some(percent.min(100.0));
            }

            if last_publish.elapsed() >= PUBLISH_INTERVAL {
                self.publisher.publish(snapshot);
                last_publish = Instant::now();
            }
        }

        self.sink.close().await?;
        Ok(())
    }
}
