//! Progress UI (per-item bars) for download runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use vaultdl_core::{DownloadManager, DownloadStatus};

/// Spawns the progress UI (one bar per download) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_bars` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_bars: bool,
    manager: DownloadManager,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_bars {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bars_inner(manager, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bars_inner(
    manager: DownloadManager,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template(
            "{spinner} {bar:30} {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        while !stop.load(Ordering::SeqCst) {
            for (item_id, snapshot) in manager.snapshot() {
                let bar = bars.entry(item_id).or_insert_with(|| {
                    let bar = multi.add(ProgressBar::new(0));
                    bar.set_style(style.clone());
                    bar
                });
                if bar.is_finished() {
                    continue;
                }
                if let Some(total) = snapshot.total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(snapshot.received_bytes);

                let speed = snapshot
                    .speed_bps
                    .map(|bps| format!(" @ {}/s", HumanBytes(bps)))
                    .unwrap_or_default();
                bar.set_message(format!(
                    "{} [{}]{}",
                    snapshot.filename,
                    status_label(snapshot.status),
                    speed
                ));

                if snapshot.status.is_terminal() {
                    bar.finish();
                }
            }
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        for bar in bars.values() {
            bar.finish_and_clear();
        }
    })
}

fn status_label(status: DownloadStatus) -> &'static str {
    match status {
        DownloadStatus::Downloading => "downloading",
        DownloadStatus::Completed => "completed",
        DownloadStatus::Error => "error",
        DownloadStatus::Aborted => "aborted",
    }
}
