//! Constants for the download module (timeouts, windows, wire headers).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-read idle timeout (5 minutes). There is no total request
/// timeout; a capped archive may legitimately stream for hours.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Sliding window for throughput estimation (5 seconds).
pub const RATE_WINDOW_MS: u64 = 5_000;

/// Minimum wall time between progress snapshot publications. The terminal
/// transition is always published regardless of this interval.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(200);

/// Request header declaring the client's transfer-rate cap in KB/s
/// (`0` = unlimited); the server enforces it.
pub const SPEED_LIMIT_HEADER: &str = "X-Download-Speed-Limit";

/// Response header carrying a one-time download token. When present, the
/// token is redeemed via navigation instead of streaming the body.
pub const OTP_HEADER: &str = "X-Otp";
