//! Chunk state and the order-preserving chunker.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use matcher::SourceRecord;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChunkError, StoreError};

/// Lifecycle of one chunk.
///
/// ```text
/// Pending -> Running -> Succeeded
///               |  ^
///               v  |
///            Retrying
///               |
///   Running -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Retrying,
}

impl ChunkStatus {
    pub fn can_transition_to(self, next: ChunkStatus) -> bool {
        use ChunkStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Retrying)
                | (Retrying, Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkStatus::Succeeded | ChunkStatus::Failed)
    }
}

/// An ordered slice of the source stream plus its processing status.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the run, counting from zero across resumes.
    pub index: u64,
    /// Source offset of the first record.
    pub offset: u64,
    pub records: Arc<[SourceRecord]>,
    status: ChunkStatus,
}

impl Chunk {
    pub fn new(index: u64, offset: u64, records: Vec<SourceRecord>) -> Self {
        Self {
            index,
            offset,
            records: records.into(),
            status: ChunkStatus::Pending,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset one past the last record.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.records.len() as u64
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn transition(&mut self, next: ChunkStatus) -> Result<(), ChunkError> {
        if !self.status.can_transition_to(next) {
            return Err(ChunkError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Error type of a record source.
///
/// A record-local error (one undecodable line) becomes an
/// [`unreadable`](SourceRecord::unreadable) placeholder and reading goes on;
/// anything else ends the run.
pub trait SourceError: Display {
    fn is_record_local(&self) -> bool {
        false
    }
}

impl SourceError for StoreError {
    fn is_record_local(&self) -> bool {
        matches!(self, StoreError::Serde(_))
    }
}

impl SourceError for String {}

impl SourceError for &str {}

impl SourceError for Infallible {}

/// A record the source failed to produce.
#[derive(Debug)]
pub struct SourceFailure<E> {
    pub offset: u64,
    pub error: E,
}

/// Pulls records from a fallible source in order and cuts them into chunks
/// of the current effective size.
///
/// Given the same input and an unchanged size the chunk boundaries are
/// always the same. Shrinking the size only affects chunks cut afterwards.
#[derive(Debug)]
pub struct Chunker<I> {
    source: I,
    chunk_size: usize,
    next_index: u64,
    next_offset: u64,
    exhausted: bool,
}

impl<I, E> Chunker<I>
where
    I: Iterator<Item = Result<SourceRecord, E>>,
    E: SourceError,
{
    pub fn new(source: I, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            next_index: 0,
            next_offset: 0,
            exhausted: false,
        }
    }

    /// Positions a fresh chunker after `offset` already-processed records,
    /// reading and discarding them. The next chunk is numbered `index`.
    pub fn resume(
        source: I,
        chunk_size: usize,
        index: u64,
        offset: u64,
    ) -> Result<Self, SourceFailure<E>> {
        let mut chunker = Self::new(source, chunk_size);
        while chunker.next_offset < offset {
            match chunker.source.next() {
                Some(Ok(_)) => chunker.next_offset += 1,
                Some(Err(error)) if error.is_record_local() => chunker.next_offset += 1,
                Some(Err(error)) => {
                    return Err(SourceFailure {
                        offset: chunker.next_offset,
                        error,
                    });
                }
                None => {
                    chunker.exhausted = true;
                    break;
                }
            }
        }
        chunker.next_index = index;
        Ok(chunker)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Changes the size of subsequently cut chunks; floors at 1.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Cuts the next chunk, or `None` once the source is drained.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceFailure<E>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(self.chunk_size.min(64 * 1024));
        while records.len() < self.chunk_size {
            match self.source.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(error)) if error.is_record_local() => {
                    warn!(
                        event = "source_record_unreadable",
                        offset = self.next_offset + records.len() as u64,
                        error = %error,
                        "skipping undecodable source record"
                    );
                    records.push(SourceRecord::unreadable());
                }
                Some(Err(error)) => {
                    return Err(SourceFailure {
                        offset: self.next_offset + records.len() as u64,
                        error,
                    });
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if records.is_empty() {
            return Ok(None);
        }
        let chunk = Chunk::new(self.next_index, self.next_offset, records);
        self.next_index += 1;
        self.next_offset = chunk.end_offset();
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn source(n: usize) -> impl Iterator<Item = Result<SourceRecord, Infallible>> {
        (0..n).map(|i| Ok(SourceRecord::new(format!("r{i}"))))
    }

    fn drain<I, E>(chunker: &mut Chunker<I>) -> Vec<Chunk>
    where
        I: Iterator<Item = Result<SourceRecord, E>>,
        E: SourceError + std::fmt::Debug,
    {
        let mut out = Vec::new();
        while let Some(chunk) = chunker.next_chunk().expect("source never fails") {
            out.push(chunk);
        }
        out
    }

    #[test]
    fn legal_transitions() {
        use ChunkStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Retrying.can_transition_to(Failed));
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let mut chunk = Chunk::new(0, 0, vec![SourceRecord::new("a")]);
        chunk.transition(ChunkStatus::Running).expect("pending -> running");
        chunk.transition(ChunkStatus::Succeeded).expect("running -> succeeded");
        let err = chunk.transition(ChunkStatus::Running).expect_err("terminal");
        assert_eq!(
            err,
            ChunkError::IllegalTransition {
                from: ChunkStatus::Succeeded,
                to: ChunkStatus::Running
            }
        );
    }

    #[test]
    fn chunks_cover_input_exactly_once() {
        for size in [1, 3, 7, 10, 11, 100] {
            let mut chunker = Chunker::new(source(10), size);
            let chunks = drain(&mut chunker);
            let ids: Vec<String> = chunks
                .iter()
                .flat_map(|c| c.records.iter().map(|r| r.id.clone()))
                .collect();
            let expected: Vec<String> = (0..10).map(|i| format!("r{i}")).collect();
            assert_eq!(ids, expected, "chunk_size {size}");
            assert!(chunks.iter().all(|c| c.len() <= size));
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end_offset(), pair[1].offset);
                assert_eq!(pair[0].index + 1, pair[1].index);
            }
        }
    }

    #[test]
    fn shrinking_affects_later_chunks_only() {
        let mut chunker = Chunker::new(source(10), 4);
        let first = chunker.next_chunk().expect("ok").expect("chunk");
        chunker.set_chunk_size(2);
        let rest = drain(&mut chunker);
        assert_eq!(first.len(), 4);
        assert_eq!(rest.iter().map(Chunk::len).collect::<Vec<_>>(), vec![2, 2, 2]);
    }

    #[test]
    fn resume_skips_processed_records() {
        let mut chunker = Chunker::resume(source(10), 3, 2, 6).expect("resume");
        let chunks = drain(&mut chunker);
        assert_eq!(chunks[0].index, 2);
        assert_eq!(chunks[0].offset, 6);
        assert_eq!(chunks[0].records[0].id, "r6");
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), 4);
    }

    #[test]
    fn source_error_reports_offset() {
        let src = (0..5).map(|i| {
            if i == 3 {
                Err("truncated line")
            } else {
                Ok(SourceRecord::new(format!("r{i}")))
            }
        });
        let mut chunker = Chunker::new(src, 2);
        assert!(chunker.next_chunk().expect("first chunk").is_some());
        let failure = chunker.next_chunk().expect_err("second chunk hits the error");
        assert_eq!(failure.offset, 3);
        assert_eq!(failure.error, "truncated line");
    }

    #[test]
    fn undecodable_entries_become_placeholders() {
        let bad = || StoreError::Serde(serde_json::from_str::<u8>("x").expect_err("not json"));
        let src = (0..5).map(|i| {
            if i == 1 || i == 3 {
                Err(bad())
            } else {
                Ok(SourceRecord::new(format!("r{i}")))
            }
        });
        let mut chunker = Chunker::new(src, 2);
        let chunks = drain(&mut chunker);
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), 5);
        let unreadable: Vec<bool> = chunks
            .iter()
            .flat_map(|c| c.records.iter().map(SourceRecord::is_unreadable))
            .collect();
        assert_eq!(unreadable, vec![false, true, false, true, false]);
    }

    #[test]
    fn io_errors_stay_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "disk gone");
        assert!(!StoreError::Io(io).is_record_local());
        let src = vec![Ok(SourceRecord::new("r0")), Err(StoreError::Io(std::io::Error::other("reset")))];
        let mut chunker = Chunker::new(src.into_iter(), 5);
        assert_eq!(chunker.next_chunk().expect_err("fatal").offset, 1);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut chunker = Chunker::new(source(0), 5);
        assert!(chunker.next_chunk().expect("ok").is_none());
    }
}
