//! JSON Lines adapters for datasets, results, spill files and the metrics
//! artifact.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use matcher::MatchResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SinkError, StoreError};
use crate::memory::SpillStore;
use crate::metrics::{MetricsReport, MetricsSink};
use crate::sink::ResultSink;

/// Iterates one JSON value per line. Blank lines are skipped.
///
/// Works for both [`SourceRecord`](matcher::SourceRecord) and
/// [`CandidateRecord`](matcher::CandidateRecord) streams; a line that fails
/// to read or parse yields an error and iteration can continue past it.
#[derive(Debug)]
pub struct JsonLinesReader<R, T> {
    reader: R,
    line: String,
    line_number: u64,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonLinesReader<BufReader<File>, T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead, T> JsonLinesReader<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            _record: PhantomData,
        }
    }

    /// 1-based number of the last line read.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonLinesReader<R, T> {
    type Item = Result<T, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
            self.line_number += 1;
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(trimmed).map_err(StoreError::from));
        }
    }
}

fn write_lines<W: Write, S: Serialize>(writer: &mut W, items: &[S]) -> std::io::Result<()> {
    for item in items {
        serde_json::to_writer(&mut *writer, item)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writes each accepted batch as JSON lines and flushes per chunk.
#[derive(Debug)]
pub struct JsonLinesResultSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
}

impl JsonLinesResultSink<File> {
    /// Appends to `path`, creating it if needed. For resumed runs.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(open_append(path.as_ref())?))
    }

    /// Truncates `path`, creating it if needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Send> JsonLinesResultSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| SinkError::Rejected("writer lock poisoned".into()))?;
        writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))
    }
}

impl<W: Write + Send> ResultSink for JsonLinesResultSink<W> {
    fn accept(&self, _chunk_index: u64, results: &[MatchResult]) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::Rejected("writer lock poisoned".into()))?;
        write_lines(&mut *writer, results)?;
        writer.flush()?;
        Ok(())
    }
}

/// Appends spilled results to a JSON Lines file.
#[derive(Debug, Clone)]
pub struct JsonLinesSpill {
    path: PathBuf,
}

impl JsonLinesSpill {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpillStore for JsonLinesSpill {
    fn spill(&self, results: &[MatchResult]) -> Result<(), StoreError> {
        let mut writer = BufWriter::new(open_append(&self.path)?);
        write_lines(&mut writer, results)?;
        writer.flush()?;
        Ok(())
    }
}

/// Writes the metrics artifact as pretty JSON, replacing any previous file.
#[derive(Debug, Clone)]
pub struct JsonFileMetricsSink {
    path: PathBuf,
}

impl JsonFileMetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonFileMetricsSink {
    fn emit(&self, report: &MetricsReport) -> Result<(), StoreError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
