//! Sliding-window throughput estimation for one transfer.
//!
//! A window of `(timestamp, cumulative bytes)` samples smooths bursty chunk
//! arrival without the lag of a full-transfer average, and bounding the
//! window caps memory use for long transfers. A transfer that stalls for
//! longer than the window decays its reported speed toward the most recent
//! burst rather than freezing at a stale high value.

use std::collections::VecDeque;

use super::constants::RATE_WINDOW_MS;

/// Throughput estimator over a bounded time window of byte-count samples.
///
/// Timestamps are caller-supplied milliseconds from an arbitrary monotonic
/// origin (the task uses elapsed time since it started). Samples must be
/// recorded in non-decreasing time order; a repeated timestamp updates the
/// byte count of the existing sample instead of breaking strict ordering.
#[derive(Debug)]
pub struct RateEstimator {
    window_ms: u64,
    /// Time-ordered `(timestamp_ms, cumulative_bytes)` pairs.
    samples: VecDeque<(u64, u64)>,
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RateEstimator {
    /// Creates an estimator with the default 5 second window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW_MS)
    }

    /// Creates an estimator with an explicit window, in milliseconds.
    #[must_use]
    pub fn with_window(window_ms: u64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::new(),
        }
    }

    /// Appends a sample and evicts samples older than the window
    /// relative to `now_ms`.
    pub fn record(&mut self, now_ms: u64, cumulative_bytes: u64) {
        self.prune(now_ms);
        match self.samples.back_mut() {
            Some(last) if last.0 == now_ms => last.1 = cumulative_bytes,
            _ => self.samples.push_back((now_ms, cumulative_bytes)),
        }
    }

    /// Returns the current throughput in bytes per second, computed from
    /// the oldest retained sample to the supplied point-in-time totals.
    ///
    /// Returns `None` when no sample is retained or the elapsed time is
    /// non-positive (a single sample taken at `now_ms` cannot yield a rate).
    pub fn estimate_bps(&mut self, now_ms: u64, cumulative_bytes: u64) -> Option<u64> {
        self.prune(now_ms);
        let &(oldest_ms, oldest_bytes) = self.samples.front()?;
        let elapsed_ms = now_ms.checked_sub(oldest_ms).filter(|ms| *ms > 0)?;
        let bytes = cumulative_bytes.saturating_sub(oldest_bytes);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some((bytes as f64 * 1000.0 / elapsed_ms as f64) as u64)
    }

    fn prune(&mut self, now_ms: u64) {
        while let Some(&(ts, _)) = self.samples.front() {
            if now_ms.saturating_sub(ts) > self.window_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
