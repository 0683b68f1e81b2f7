//! File system watcher with debouncing.
//!
//! Watches a repository root with `notify`, collapsing repeated events on
//! the same path into one per debounce window via
//! `notify-debouncer-mini`'s built-in path -> latest-event map, per
//! spec.md §4.7's debounce-queue design.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use tokio::sync::mpsc;

use crate::config::WatcherConfig;
use crate::error::{MuError, MuResult};
use crate::types::{Language, PipelineEvent};

/// File system watcher that emits pipeline events for a repository root.
pub struct FileWatcher {
    config: WatcherConfig,
    root: PathBuf,
}

impl FileWatcher {
    /// Create a new file watcher for the given root directory.
    #[must_use]
    pub fn new(root: &Path, config: &WatcherConfig) -> Self {
        Self {
            config: config.clone(),
            root: root.to_path_buf(),
        }
    }

    /// Watch `self.root` for changes, forwarding debounced events through
    /// `tx`. Runs until the channel closes.
    ///
    /// The blocking `notify` callback runs on its own thread; this function
    /// itself is a thin async bridge that forwards onto the tokio channel.
    pub async fn watch(&self, tx: mpsc::Sender<PipelineEvent>) -> MuResult<()> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(
            Duration::from_millis(self.config.debounce_ms),
            move |result: DebounceEventResult| {
                let _ = raw_tx.send(result);
            },
        )
        .map_err(|e| MuError::Internal(format!("failed to create file watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| MuError::Internal(format!("failed to watch {}: {e}", self.root.display())))?;

        tracing::info!(root = %self.root.display(), debounce_ms = self.config.debounce_ms, "file watcher started");

        while let Some(result) = raw_rx.recv().await {
            match result {
                Ok(events) => {
                    for event in events {
                        let Some(pipeline_event) = self.classify(&event.path, event.kind) else {
                            continue;
                        };
                        if tx.send(pipeline_event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(error = %error, "file watcher error");
                    }
                }
            }
        }

        Ok(())
    }

    /// Perform a full directory scan and emit `FileChanged` for all
    /// currently-supported source files.
    pub async fn full_scan(&self, tx: &mpsc::Sender<PipelineEvent>) -> MuResult<usize> {
        let mut count = 0;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if self.is_supported(&path) {
                    if tx.send(PipelineEvent::FileChanged { path }).await.is_err() {
                        return Ok(count);
                    }
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn classify(&self, path: &Path, kind: DebouncedEventKind) -> Option<PipelineEvent> {
        match kind {
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous => {
                if path.exists() {
                    self.is_supported(path).then(|| PipelineEvent::FileChanged { path: path.to_path_buf() })
                } else {
                    Some(PipelineEvent::FileDeleted { path: path.to_path_buf() })
                }
            }
            _ => None,
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        !matches!(Language::from_extension(ext), Language::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_scan_finds_supported_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "x = 1\n").expect("write");
        std::fs::write(dir.path().join("b.unsupported"), "noise\n").expect("write");

        let watcher = FileWatcher::new(dir.path(), &WatcherConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let count = watcher.full_scan(&tx).await.expect("scan");
        drop(tx);

        assert_eq!(count, 1);
        let event = rx.recv().await.expect("event");
        assert!(matches!(event, PipelineEvent::FileChanged { .. }));
    }

    #[test]
    fn test_is_supported_filters_by_extension() {
        let watcher = FileWatcher::new(Path::new("."), &WatcherConfig::default());
        assert!(watcher.is_supported(Path::new("a.py")));
        assert!(!watcher.is_supported(Path::new("a.unsupported")));
    }
}
