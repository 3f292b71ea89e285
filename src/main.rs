//! CLI entry point for the vaultdl tool.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use vaultdl_core::{
    DownloadManager, DownloadStatus, ServerSession, SinkCapabilities, SpeedLimitStore,
    TaskSnapshot, format_limit,
};

mod cli;
mod progress;

use cli::{Args, Command, LimitAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let state_file = state_file_path(args.state_dir.clone())?;

    match &args.command {
        Command::Limit { action } => run_limit(&state_file, action),
        Command::Fetch { item_ids, filename } => {
            run_fetch(&args, &state_file, item_ids.clone(), filename.clone()).await
        }
    }
}

fn run_limit(state_file: &Path, action: &LimitAction) -> Result<()> {
    let store = SpeedLimitStore::load(state_file)?;
    match action {
        LimitAction::Get => {
            println!("{}", format_limit(store.get()));
        }
        LimitAction::Set { kbps } => {
            store.set(*kbps)?;
            println!("Speed limit set to {}", format_limit(store.get()));
        }
    }
    Ok(())
}

async fn run_fetch(
    args: &Args,
    state_file: &Path,
    item_ids: Vec<String>,
    filename: Option<String>,
) -> Result<()> {
    if filename.is_some() && item_ids.len() > 1 {
        bail!("--filename only applies when fetching a single item");
    }

    let server = args
        .server
        .clone()
        .or_else(|| std::env::var("VAULTDL_SERVER").ok())
        .context("no server address: pass --server or set VAULTDL_SERVER")?;
    let token = args
        .token
        .clone()
        .or_else(|| std::env::var("VAULTDL_TOKEN").ok());

    let session = ServerSession::new(&server, token)?;
    let store = Arc::new(SpeedLimitStore::load(state_file)?);
    info!(
        server = %server,
        limit = %format_limit(store.get()),
        "vaultdl starting"
    );

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;

    let manager = DownloadManager::new(
        session,
        Arc::clone(&store),
        SinkCapabilities::direct(&args.output_dir),
    );

    for item_id in &item_ids {
        let name = filename
            .clone()
            .unwrap_or_else(|| format!("{item_id}.zip"));
        if manager.start(item_id, &name) {
            debug!(item_id = %item_id, filename = %name, "download started");
        } else {
            warn!(item_id = %item_id, "download already in progress, skipping");
        }
    }

    let use_bars = !args.quiet && std::io::stderr().is_terminal();
    let (ui_handle, ui_stop) = progress::spawn_progress_ui(use_bars, manager.clone());

    let final_snapshot = wait_for_completion(&manager, &item_ids).await;

    ui_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = ui_handle {
        let _ = handle.await;
    }

    let mut failed = 0usize;
    for item_id in &item_ids {
        let Some(snapshot) = final_snapshot.get(item_id) else {
            continue;
        };
        match snapshot.status {
            DownloadStatus::Completed => {
                info!(
                    item_id = %item_id,
                    filename = %snapshot.filename,
                    bytes = snapshot.received_bytes,
                    "download completed"
                );
            }
            DownloadStatus::Aborted => {
                warn!(item_id = %item_id, "download aborted");
            }
            DownloadStatus::Error => {
                failed += 1;
                warn!(
                    item_id = %item_id,
                    error = snapshot.error_message.as_deref().unwrap_or("unknown"),
                    "download failed"
                );
            }
            DownloadStatus::Downloading => {}
        }
    }

    if failed > 0 {
        bail!("{failed} of {} downloads failed", item_ids.len());
    }
    Ok(())
}

/// Polls the manager until every requested item reaches a terminal state.
/// Ctrl-C cancels all in-flight downloads; the loop then waits for them
/// to settle as aborted before the process exits.
async fn wait_for_completion(
    manager: &DownloadManager,
    item_ids: &[String],
) -> HashMap<String, TaskSnapshot> {
    let mut cancelled = false;
    loop {
        let snapshot = manager.snapshot();
        let all_terminal = item_ids.iter().all(|id| {
            snapshot
                .get(id)
                .is_some_and(|entry| entry.status.is_terminal())
        });
        if all_terminal {
            return snapshot;
        }

        if cancelled {
            tokio::time::sleep(Duration::from_millis(150)).await;
            continue;
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(150)) => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("interrupt received, cancelling downloads");
                    for item_id in item_ids {
                        manager.cancel(item_id);
                    }
                    cancelled = true;
                }
            }
        }
    }
}

/// Resolves the directory holding persisted settings.
/// Defaults to `$XDG_CONFIG_HOME/vaultdl` (or `$HOME/.config/vaultdl`).
fn state_file_path(state_dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match state_dir {
        Some(dir) => dir,
        None => {
            let base = std::env::var_os("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
                })
                .context("cannot resolve config directory: set HOME or pass --state-dir")?;
            base.join("vaultdl")
        }
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating state directory {}", dir.display()))?;
    Ok(dir.join("speed_limit.json"))
}
