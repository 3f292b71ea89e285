//! Vault Download Core Library
//!
//! This library provides the concurrent download subsystem of the vault
//! client: fetching large game archives from the server, tracking per-item
//! progress and throughput, supporting cancellation, and honoring a
//! persisted transfer-rate cap.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Transfer engine: manager, tasks, sinks, rate tracking
//! - [`session`] - Authenticated HTTP session against the vault server

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod session;

// Re-export commonly used types
pub use download::{
    DownloadError, DownloadManager, DownloadStatus, Navigator, SavePicker, SinkCapabilities,
    SpeedLimitStore, TaskSnapshot, format_limit,
};
pub use session::{ServerSession, SessionError};
