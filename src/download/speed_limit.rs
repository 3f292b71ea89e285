//! Persisted transfer-rate cap shared by all transfers.
//!
//! The cap is a single integer in kilobytes per second (`0` = unlimited).
//! It is loaded once at startup from an explicitly injected file path,
//! held in memory, written through on every change, and broadcast to
//! in-process observers over a watch channel. Tasks read the cap once at
//! start; a change never retroactively affects a transfer in flight.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Units for the display helper, scaled by factors of 1000.
const LIMIT_UNITS: [&str; 4] = ["KB/s", "MB/s", "GB/s", "TB/s"];

/// Errors from loading or persisting the speed limit file.
#[derive(Debug, Error)]
pub enum SpeedLimitError {
    /// Reading or writing the persisted file failed.
    #[error("IO error accessing {path}: {source}")]
    Io {
        /// The persisted file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted file exists but does not parse.
    #[error("malformed speed limit file {path}: {source}")]
    Parse {
        /// The persisted file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk document. The legacy `speed_limit_bps` key (bytes per second)
/// is recognized for one-time migration and rewritten under the current
/// key on first load.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedLimit {
    #[serde(skip_serializing_if = "Option::is_none")]
    speed_limit_kbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed_limit_bps: Option<u64>,
}

/// Process-wide transfer-rate cap with write-through persistence and
/// observer notification.
#[derive(Debug)]
pub struct SpeedLimitStore {
    path: PathBuf,
    tx: watch::Sender<u64>,
}

impl SpeedLimitStore {
    /// Loads the store from `path`, migrating a legacy bytes-per-second
    /// value if one is found. A missing file means no cap (`0`).
    ///
    /// # Errors
    ///
    /// Returns [`SpeedLimitError`] if the file exists but cannot be read
    /// or parsed, or if the post-migration rewrite fails.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SpeedLimitError> {
        let path = path.into();
        let kbps = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let persisted: PersistedLimit =
                    serde_json::from_str(&contents).map_err(|source| SpeedLimitError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                match (persisted.speed_limit_kbps, persisted.speed_limit_bps) {
                    (Some(kbps), _) => kbps,
                    (None, Some(bps)) => {
                        let migrated = migrate_legacy_bps(bps);
                        info!(bps, kbps = migrated, "migrated legacy speed limit to KB/s");
                        // Rewrite under the current key so the legacy one
                        // is never consulted again.
                        persist(&path, migrated)?;
                        migrated
                    }
                    (None, None) => 0,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(source) => {
                return Err(SpeedLimitError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        debug!(kbps, path = %path.display(), "speed limit loaded");
        let (tx, _) = watch::channel(kbps);
        Ok(Self { path, tx })
    }

    /// Returns the current cap in kilobytes per second (`0` = unlimited).
    #[must_use]
    pub fn get(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Clamps `value` to `>= 0`, persists it, and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`SpeedLimitError::Io`] if the write-through fails. The
    /// in-memory value and observers are updated regardless, so the
    /// process keeps a consistent view even when the disk is unhappy.
    pub fn set(&self, value: i64) -> Result<(), SpeedLimitError> {
        #[allow(clippy::cast_sign_loss)]
        let clamped = value.max(0) as u64;
        self.tx.send_replace(clamped);
        info!(kbps = clamped, "speed limit changed");
        persist(&self.path, clamped)
    }

    /// Returns a receiver that observes every cap change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// Converts a legacy bytes-per-second value to kilobytes per second.
/// Positive values round to at least 1 KB/s so a small configured cap
/// does not silently become unlimited.
fn migrate_legacy_bps(bps: u64) -> u64 {
    if bps == 0 {
        0
    } else {
        bps.div_ceil(1000).max(1)
    }
}

fn persist(path: &Path, kbps: u64) -> Result<(), SpeedLimitError> {
    let document = PersistedLimit {
        speed_limit_kbps: Some(kbps),
        speed_limit_bps: None,
    };
    let io_err = |source| SpeedLimitError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let contents = serde_json::to_string_pretty(&document).map_err(|source| {
        SpeedLimitError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    std::fs::write(path, contents).map_err(io_err)
}

/// Formats a KB/s cap for display: `0` is "Unlimited", anything else is
/// scaled by dividing by 1000 while >= 1000 (capped at TB/s) with
/// trailing zeros trimmed.
#[must_use]
pub fn format_limit(kbps: u64) -> String {
    if kbps == 0 {
        return "Unlimited".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = kbps as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < LIMIT_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    // Two decimals, then let f64 Display drop trailing zeros.
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", LIMIT_UNITS[unit])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> PathBuf {
        dir.path().join("speed_limit.json")
    }

    #[test]
    fn test_missing_file_means_unlimited() {
        let dir = TempDir::new().unwrap();
        let store = SpeedLimitStore::load(store_path(&dir)).unwrap();
        assert_eq!(store.get(), 0);
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let store = SpeedLimitStore::load(store_path(&dir)).unwrap();
        store.set(2500).unwrap();
        assert_eq!(store.get(), 2500);

        let reloaded = SpeedLimitStore::load(store_path(&dir)).unwrap();
        assert_eq!(reloaded.get(), 2500);
    }

    #[test]
    fn test_set_negative_clamps_to_zero() {
        let dir = TempDir::new().unwrap();
        let store = SpeedLimitStore::load(store_path(&dir)).unwrap();
        store.set(-5).unwrap();
        assert_eq!(store.get(), 0);
    }

    #[test]
    fn test_legacy_bytes_per_second_migrates_once() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        std::fs::write(&path, r#"{"speed_limit_bps": 500000}"#).unwrap();

        let store = SpeedLimitStore::load(&path).unwrap();
        assert_eq!(store.get(), 500);

        // The file was rewritten under the current key; the legacy key is
        // gone and is not consulted on the next load.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("speed_limit_kbps"));
        assert!(!contents.contains("speed_limit_bps"));
        let reloaded = SpeedLimitStore::load(&path).unwrap();
        assert_eq!(reloaded.get(), 500);
    }

    #[test]
    fn test_small_positive_legacy_value_rounds_up_to_one() {
        assert_eq!(migrate_legacy_bps(1), 1);
        assert_eq!(migrate_legacy_bps(999), 1);
        assert_eq!(migrate_legacy_bps(0), 0);
        assert_eq!(migrate_legacy_bps(1500), 2);
    }

    #[test]
    fn test_current_key_wins_over_legacy() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        std::fs::write(&path, r#"{"speed_limit_kbps": 42, "speed_limit_bps": 500000}"#).unwrap();
        let store = SpeedLimitStore::load(&path).unwrap();
        assert_eq!(store.get(), 42);
    }

    #[test]
    fn test_subscribe_observes_changes() {
        let dir = TempDir::new().unwrap();
        let store = SpeedLimitStore::load(store_path(&dir)).unwrap();
        let rx = store.subscribe();
        store.set(100).unwrap();
        assert_eq!(*rx.borrow(), 100);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        std::fs::write(&path, "{ not json").unwrap();
        let result = SpeedLimitStore::load(&path);
        assert!(matches!(result, Err(SpeedLimitError::Parse { .. })));
    }

    #[test]
    fn test_format_limit_zero_is_unlimited() {
        assert_eq!(format_limit(0), "Unlimited");
    }

    #[test]
    fn test_format_limit_kilobytes() {
        assert_eq!(format_limit(500), "500 KB/s");
    }

    #[test]
    fn test_format_limit_scales_to_megabytes() {
        assert_eq!(format_limit(2500), "2.5 MB/s");
    }

    #[test]
    fn test_format_limit_caps_at_terabytes() {
        assert_eq!(format_limit(5_000_000_000_000), "5000 TB/s");
    }

    #[test]
    fn test_format_limit_trims_trailing_zeros() {
        assert_eq!(format_limit(1000), "1 MB/s");
        assert_eq!(format_limit(1250), "1.25 MB/s");
    }
}
