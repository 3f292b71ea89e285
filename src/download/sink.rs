//! Destinations for received bytes.
//!
//! A [`TransferSink`] is where a transfer's chunks end up. The concrete
//! variant is negotiated once per task by [`SinkCapabilities::negotiate`];
//! the streaming loop only ever talks to the trait and never touches the
//! filesystem directly.
//!
//! Variants:
//! - [`DirectFileSink`] — the host exposes a configured download
//!   directory; chunks append to a file created there.
//! - [`PickerSink`] — an interactive save-location capability chooses the
//!   destination; the user declining is not an error, it aborts the task.
//! - [`BufferSink`] — no directory and no picker; chunks buffer in memory
//!   and a single artifact is flushed into a fallback downloads directory
//!   on completion.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::error::DownloadError;

/// Result of negotiating a destination with the user or host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The destination is open and ready for writes.
    Ready,
    /// The user declined to choose a destination. The task treats this as
    /// cancellation, never as an error.
    Declined,
}

/// Polymorphic destination for received bytes.
///
/// `write` calls must complete in receipt order before the next chunk is
/// requested from the network; no variant tolerates parallel writers.
/// `abort` is best-effort cleanup and swallows its own failures.
#[async_trait]
pub trait TransferSink: Send {
    /// Opens the destination for `suggested_name`. Failures here are fatal
    /// to the task; a [`OpenOutcome::Declined`] aborts it.
    async fn open(&mut self, suggested_name: &str) -> Result<OpenOutcome, DownloadError>;

    /// Appends one chunk. Chunks are written strictly in receipt order.
    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError>;

    /// Flushes and finalizes the destination.
    async fn close(&mut self) -> Result<(), DownloadError>;

    /// Best-effort cleanup after cancellation or failure. A partial file
    /// may be left behind; removing it is out of scope.
    async fn abort(&mut self);
}

/// Interactive save-location capability. `None` means the user declined.
pub trait SavePicker: Send + Sync {
    /// Asks the user for a destination path for `suggested_name`.
    fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf>;
}

/// Host capabilities probed once at task start to select a sink variant.
///
/// Selection order: a configured download directory wins, then an
/// interactive picker, then the in-memory buffer.
#[derive(Clone)]
pub struct SinkCapabilities {
    /// Configured local download directory, when the host has one.
    pub download_dir: Option<PathBuf>,
    /// Interactive save-location capability, when the host has one.
    pub picker: Option<Arc<dyn SavePicker>>,
    /// Where buffered artifacts land when neither of the above exists.
    pub fallback_dir: PathBuf,
}

impl SinkCapabilities {
    /// Capabilities for a host with a configured download directory.
    #[must_use]
    pub fn direct(download_dir: impl Into<PathBuf>) -> Self {
        let dir = download_dir.into();
        Self {
            download_dir: Some(dir.clone()),
            picker: None,
            fallback_dir: dir,
        }
    }

    /// Selects the sink variant for one transfer.
    #[must_use]
    pub fn negotiate(&self) -> Box<dyn TransferSink> {
        if let Some(dir) = &self.download_dir {
            return Box::new(DirectFileSink::new(dir.clone()));
        }
        if let Some(picker) = &self.picker {
            return Box::new(PickerSink::new(Arc::clone(picker)));
        }
        Box::new(BufferSink::new(self.fallback_dir.clone()))
    }
}

impl std::fmt::Debug for SinkCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkCapabilities")
            .field("download_dir", &self.download_dir)
            .field("picker", &self.picker.is_some())
            .field("fallback_dir", &self.fallback_dir)
            .finish()
    }
}

/// Ordered buffered writes to one open file; shared by the file-backed
/// sink variants.
struct FileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileWriter {
    async fn create(path: PathBuf) -> Result<Self, DownloadError> {
        let file = File::create(&path).await.map_err(|e| {
            DownloadError::sink_unavailable(format!("{}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "destination file opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::sink_io(self.path.clone(), e))
    }

    async fn close(mut self) -> Result<(), DownloadError> {
        self.writer
            .flush()
            .await
            .map_err(|e| DownloadError::sink_io(self.path.clone(), e))
    }

    /// Flushes what we can and closes the handle. The partial file stays
    /// on disk.
    async fn abort(mut self) {
        if let Err(e) = self.writer.flush().await {
            warn!(path = %self.path.display(), error = %e, "flush during abort failed");
        }
    }
}

/// Writes chunks to a file in a configured local download directory.
pub struct DirectFileSink {
    dir: PathBuf,
    writer: Option<FileWriter>,
}

impl DirectFileSink {
    /// Creates a sink targeting `dir`. The file itself is created by
    /// `open` from the suggested name.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, writer: None }
    }
}

#[async_trait]
impl TransferSink for DirectFileSink {
    async fn open(&mut self, suggested_name: &str) -> Result<OpenOutcome, DownloadError> {
        let path = self.dir.join(suggested_name);
        self.writer = Some(FileWriter::create(path).await?);
        Ok(OpenOutcome::Ready)
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(chunk).await,
            None => Err(DownloadError::sink_unavailable("write before open")),
        }
    }

    async fn close(&mut self) -> Result<(), DownloadError> {
        match self.writer.take() {
            Some(writer) => writer.close().await,
            None => Err(DownloadError::sink_unavailable("close before open")),
        }
    }

    async fn abort(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort().await;
        }
    }
}

/// Writes chunks to a path the user chose through a save picker.
pub struct PickerSink {
    picker: Arc<dyn SavePicker>,
    writer: Option<FileWriter>,
}

impl PickerSink {
    #[must_use]
    pub fn new(picker: Arc<dyn SavePicker>) -> Self {
        Self {
            picker,
            writer: None,
        }
    }
}

#[async_trait]
impl TransferSink for PickerSink {
    async fn open(&mut self, suggested_name: &str) -> Result<OpenOutcome, DownloadError> {
        let Some(path) = self.picker.pick_save_path(suggested_name) else {
            debug!(suggested_name, "save prompt declined");
            return Ok(OpenOutcome::Declined);
        };
        self.writer = Some(FileWriter::create(path).await?);
        Ok(OpenOutcome::Ready)
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(chunk).await,
            None => Err(DownloadError::sink_unavailable("write before open")),
        }
    }

    async fn close(&mut self) -> Result<(), DownloadError> {
        match self.writer.take() {
            Some(writer) => writer.close().await,
            None => Err(DownloadError::sink_unavailable("close before open")),
        }
    }

    async fn abort(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort().await;
        }
    }
}

/// Buffers chunks in memory and flushes one artifact into the fallback
/// downloads directory on close. Abort discards the buffer.
pub struct BufferSink {
    fallback_dir: PathBuf,
    name: String,
    buffer: Vec<u8>,
}

impl BufferSink {
    #[must_use]
    pub fn new(fallback_dir: PathBuf) -> Self {
        Self {
            fallback_dir,
            name: String::new(),
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl TransferSink for BufferSink {
    async fn open(&mut self, suggested_name: &str) -> Result<OpenOutcome, DownloadError> {
        self.name = suggested_name.to_string();
        Ok(OpenOutcome::Ready)
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DownloadError> {
        let name = if self.name.is_empty() {
            "download.bin"
        } else {
            &self.name
        };
        let path = self.fallback_dir.join(name);
        tokio::fs::create_dir_all(&self.fallback_dir)
            .await
            .map_err(|e| DownloadError::sink_io(path.clone(), e))?;
        tokio::fs::write(&path, &self.buffer)
            .await
            .map_err(|e| DownloadError::sink_io(path.clone(), e))?;
        debug!(path = %path.display(), bytes = self.buffer.len(), "buffered artifact saved");
        self.buffer = Vec::new();
        Ok(())
    }

    async fn abort(&mut self) {
        self.buffer = Vec::new();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedPicker(PathBuf);
    impl SavePicker for FixedPicker {
        fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
            Some(self.0.join(suggested_name))
        }
    }

    struct DecliningPicker;
    impl SavePicker for DecliningPicker {
        fn pick_save_path(&self, _suggested_name: &str) -> Option<PathBuf> {
            None
        }
    }

    #[tokio::test]
    async fn test_direct_sink_writes_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectFileSink::new(dir.path().to_path_buf());

        assert_eq!(sink.open("game.zip").await.unwrap(), OpenOutcome::Ready);
        sink.write(b"first ").await.unwrap();
        sink.write(b"second").await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read(dir.path().join("game.zip")).unwrap();
        assert_eq!(contents, b"first second");
    }

    #[tokio::test]
    async fn test_direct_sink_open_fails_on_unwritable_dir() {
        let mut sink = DirectFileSink::new(PathBuf::from("/nonexistent/subdir"));
        let result = sink.open("game.zip").await;
        assert!(matches!(result, Err(DownloadError::SinkUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_direct_sink_abort_leaves_partial_file() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectFileSink::new(dir.path().to_path_buf());
        sink.open("partial.zip").await.unwrap();
        sink.write(b"some bytes").await.unwrap();
        sink.abort().await;

        // Partial artifact stays on disk; cleanup is out of scope.
        let contents = std::fs::read(dir.path().join("partial.zip")).unwrap();
        assert_eq!(contents, b"some bytes");
    }

    #[tokio::test]
    async fn test_picker_sink_uses_chosen_path() {
        let dir = TempDir::new().unwrap();
        let mut sink = PickerSink::new(Arc::new(FixedPicker(dir.path().to_path_buf())));

        assert_eq!(sink.open("picked.zip").await.unwrap(), OpenOutcome::Ready);
        sink.write(b"payload").await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read(dir.path().join("picked.zip")).unwrap();
        assert_eq!(contents, b"payload");
    }

    #[tokio::test]
    async fn test_picker_sink_decline_is_not_an_error() {
        let mut sink = PickerSink::new(Arc::new(DecliningPicker));
        assert_eq!(sink.open("game.zip").await.unwrap(), OpenOutcome::Declined);
    }

    #[tokio::test]
    async fn test_buffer_sink_flushes_single_artifact_on_close() {
        let dir = TempDir::new().unwrap();
        let fallback = dir.path().join("downloads");
        let mut sink = BufferSink::new(fallback.clone());

        sink.open("buffered.zip").await.unwrap();
        sink.write(b"part one, ").await.unwrap();
        sink.write(b"part two").await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read(fallback.join("buffered.zip")).unwrap();
        assert_eq!(contents, b"part one, part two");
    }

    #[tokio::test]
    async fn test_buffer_sink_abort_discards_buffer() {
        let dir = TempDir::new().unwrap();
        let fallback = dir.path().join("downloads");
        let mut sink = BufferSink::new(fallback.clone());

        sink.open("dropped.zip").await.unwrap();
        sink.write(b"to be discarded").await.unwrap();
        sink.abort().await;

        assert!(!fallback.join("dropped.zip").exists());
    }

    #[test]
    fn test_negotiate_prefers_download_dir() {
        let caps = SinkCapabilities {
            download_dir: Some(PathBuf::from("/tmp")),
            picker: Some(Arc::new(DecliningPicker) as Arc<dyn SavePicker>),
            fallback_dir: PathBuf::from("/tmp"),
        };
        // Probe once, outside the streaming loop.
        let _sink = caps.negotiate();
    }
}
