//! Concurrent transfer engine for game archives.
//!
//! This module provides the machinery for fetching large binary archives
//! from the vault server over HTTP with streaming writes, per-item
//! progress and throughput tracking, cooperative cancellation, and a
//! persisted transfer-rate cap.
//!
//! # Overview
//!
//! The [`DownloadManager`] is the registry of all transfers. Callers ask
//! it to start or cancel transfers and poll [`DownloadManager::snapshot`]
//! for the aggregated state; each transfer runs as its own task, writing
//! received bytes through a [`TransferSink`] negotiated once at start.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultdl_core::download::{DownloadManager, SinkCapabilities, SpeedLimitStore};
//! use vaultdl_core::session::ServerSession;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = ServerSession::new("https://vault.example.org", Some("token".into()))?;
//! let limits = Arc::new(SpeedLimitStore::load("speed_limit.json")?);
//! let manager = DownloadManager::new(session, limits, SinkCapabilities::direct("./downloads"));
//! manager.start("42", "game.zip");
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod error;
mod manager;
mod rate;
mod sink;
mod speed_limit;
mod task;

pub use error::DownloadError;
pub use manager::DownloadManager;
pub use rate::RateEstimator;
pub use sink::{
    BufferSink, DirectFileSink, OpenOutcome, PickerSink, SavePicker, SinkCapabilities,
    TransferSink,
};
pub use speed_limit::{SpeedLimitError, SpeedLimitStore, format_limit};
pub use task::{DownloadStatus, LogNavigator, Navigator, TaskSnapshot};
