//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch game archives from a vault server.
///
/// vaultdl streams large archives to a local download directory with
/// per-item progress, cancellation, and a persisted transfer-rate cap
/// that the server enforces.
#[derive(Parser, Debug)]
#[command(name = "vaultdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Vault server base URL (falls back to VAULTDL_SERVER)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Bearer token for authenticated servers (falls back to VAULTDL_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Directory downloaded archives are written to
    #[arg(short, long, default_value = "./downloads")]
    pub output_dir: PathBuf,

    /// Directory holding persisted client settings (speed limit)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one or more items by id
    Fetch {
        /// Item ids to download
        #[arg(required = true)]
        item_ids: Vec<String>,

        /// Destination filename (single item only; defaults to "<id>.zip")
        #[arg(short, long)]
        filename: Option<String>,
    },

    /// Show or change the persisted transfer-rate cap
    Limit {
        #[command(subcommand)]
        action: LimitAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum LimitAction {
    /// Print the current cap
    Get,
    /// Set the cap in kilobytes per second (0 = unlimited)
    Set {
        /// New cap; negative values clamp to 0
        kbps: i64,
    },
}
