//! Per-chunk progress reporting and checkpoint/resume.
//!
//! A [`Checkpoint`] is a cursor into the source stream plus the metrics
//! accumulated up to it. It is written after every terminal chunk and read
//! once at startup. A crash mid-chunk loses that chunk's work only: on resume
//! the whole chunk is reprocessed from its first record.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunk::{Chunk, ChunkStatus};
use crate::error::{EngineError, StoreError};
use crate::metrics::RunMetrics;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub version: u32,
    /// [`EngineConfig::matching_digest`](crate::EngineConfig::matching_digest)
    /// of the run that wrote it.
    pub config_digest: String,
    pub next_chunk_index: u64,
    /// Source records already accounted for in `metrics`.
    pub next_offset: u64,
    pub effective_chunk_size: usize,
    pub metrics: RunMetrics,
}

/// Durable home for the latest checkpoint.
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError>;
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON checkpoint file replaced atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, checkpoint)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Where a run starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub next_chunk_index: u64,
    pub next_offset: u64,
    pub chunk_size: usize,
    pub metrics: RunMetrics,
}

/// Progress logging plus checkpoint bookkeeping.
///
/// Disabled tracking performs no store I/O and logs nothing.
pub struct ProgressTracker {
    enabled: bool,
    store: Option<Box<dyn CheckpointStore>>,
    digest: String,
}

impl ProgressTracker {
    pub fn new(enabled: bool, store: Option<Box<dyn CheckpointStore>>, digest: String) -> Self {
        if !enabled && store.is_some() {
            warn!(
                event = "checkpoint_store_ignored",
                "progress tracking is disabled; checkpoint store will not be used"
            );
        }
        Self {
            enabled,
            store: if enabled { store } else { None },
            digest,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Loads and vets the stored checkpoint, if any.
    pub fn resume_point(&self) -> Result<Option<ResumePoint>, EngineError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(checkpoint) = store.load()? else {
            return Ok(None);
        };
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(EngineError::CheckpointVersion(checkpoint.version));
        }
        if checkpoint.config_digest != self.digest {
            return Err(EngineError::CheckpointMismatch {
                expected: self.digest.clone(),
                found: checkpoint.config_digest,
            });
        }
        info!(
            event = "resuming_from_checkpoint",
            next_chunk_index = checkpoint.next_chunk_index,
            next_offset = checkpoint.next_offset,
            chunk_size = checkpoint.effective_chunk_size,
            "resuming run"
        );
        Ok(Some(ResumePoint {
            next_chunk_index: checkpoint.next_chunk_index,
            next_offset: checkpoint.next_offset,
            chunk_size: checkpoint.effective_chunk_size.max(1),
            metrics: checkpoint.metrics,
        }))
    }

    /// Records a chunk that reached a terminal state and persists the cursor
    /// after it. `metrics` must already include the chunk.
    pub fn chunk_finished(
        &self,
        chunk: &Chunk,
        elapsed: Duration,
        metrics: &RunMetrics,
        next_chunk_size: usize,
    ) -> Result<(), EngineError> {
        if !self.enabled {
            return Ok(());
        }
        let status = chunk.status();
        let fields = (chunk.index, chunk.len(), elapsed.as_millis() as u64);
        match status {
            ChunkStatus::Failed => warn!(
                event = "chunk_failed",
                chunk = fields.0,
                records = fields.1,
                elapsed_ms = fields.2,
                processed = metrics.total_records,
                "chunk failed after exhausting retries"
            ),
            _ => info!(
                event = "chunk_completed",
                chunk = fields.0,
                records = fields.1,
                elapsed_ms = fields.2,
                processed = metrics.total_records,
                matched = metrics.matched_records(),
                run_elapsed_ms = metrics.elapsed_ms,
                "chunk completed"
            ),
        }

        if let Some(store) = &self.store {
            store.save(&Checkpoint {
                version: CHECKPOINT_VERSION,
                config_digest: self.digest.clone(),
                next_chunk_index: chunk.index + 1,
                next_offset: chunk.end_offset(),
                effective_chunk_size: next_chunk_size,
                metrics: metrics.clone(),
            })?;
        }
        Ok(())
    }

    /// Drops the checkpoint after a run that reached the quality gate.
    pub fn complete(&self) -> Result<(), EngineError> {
        if let Some(store) = &self.store {
            store.clear()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("enabled", &self.enabled)
            .field("has_store", &self.store.is_some())
            .field("digest", &self.digest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use matcher::SourceRecord;

    use super::*;

    fn checkpoint(digest: &str) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            config_digest: digest.into(),
            next_chunk_index: 3,
            next_offset: 300,
            effective_chunk_size: 100,
            metrics: RunMetrics {
                total_records: 300,
                ..Default::default()
            },
        }
    }

    #[test]
    fn file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(dir.path().join("run.ckpt"));
        assert_eq!(store.load().expect("load"), None);

        store.save(&checkpoint("abc")).expect("save");
        assert_eq!(store.load().expect("load"), Some(checkpoint("abc")));
        assert!(!store.temp_path().exists());

        store.clear().expect("clear");
        store.clear().expect("clearing twice is fine");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn digest_mismatch_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(dir.path().join("run.ckpt"));
        store.save(&checkpoint("old")).expect("save");

        let tracker = ProgressTracker::new(true, Some(Box::new(store)), "new".into());
        let err = tracker.resume_point().expect_err("digest differs");
        assert!(matches!(err, EngineError::CheckpointMismatch { .. }));
    }

    #[test]
    fn resume_point_carries_cursor_and_metrics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(dir.path().join("run.ckpt"));
        store.save(&checkpoint("d")).expect("save");

        let tracker = ProgressTracker::new(true, Some(Box::new(store)), "d".into());
        let point = tracker.resume_point().expect("ok").expect("checkpoint present");
        assert_eq!(point.next_chunk_index, 3);
        assert_eq!(point.next_offset, 300);
        assert_eq!(point.metrics.total_records, 300);
    }

    #[test]
    fn chunk_finished_writes_cursor_after_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.ckpt");
        let tracker =
            ProgressTracker::new(true, Some(Box::new(FileCheckpointStore::new(&path))), "d".into());

        let mut chunk = Chunk::new(4, 40, vec![SourceRecord::new("a"), SourceRecord::new("b")]);
        chunk.transition(ChunkStatus::Running).expect("start");
        chunk.transition(ChunkStatus::Succeeded).expect("finish");
        tracker
            .chunk_finished(&chunk, Duration::from_millis(5), &RunMetrics::new(), 10)
            .expect("saved");

        let saved = FileCheckpointStore::new(&path).load().expect("load").expect("present");
        assert_eq!(saved.next_chunk_index, 5);
        assert_eq!(saved.next_offset, 42);
        assert_eq!(saved.effective_chunk_size, 10);
    }

    #[test]
    fn disabled_tracker_never_touches_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.ckpt");
        let store = FileCheckpointStore::new(&path);
        store.save(&checkpoint("other")).expect("save");

        let tracker = ProgressTracker::new(false, Some(Box::new(store)), "d".into());
        assert_eq!(tracker.resume_point().expect("ok"), None);
        tracker.complete().expect("no-op");
        assert!(path.exists());
    }
}
