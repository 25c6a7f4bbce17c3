//! # Document Sink
//!
//! Where decoded summaries go. Upserts are keyed by access key and must be
//! idempotent: re-running a sync over an already committed NSU range (after
//! a manual backfill, say) must not duplicate records.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use dfe_client::DocumentSummary;
use dfe_core::AccessKey;
use parking_lot::Mutex;

use crate::error::SinkError;

/// Receiver of decoded document summaries.
pub trait DocumentSink: Send + Sync {
    /// Insert or replace the summary stored under its access key.
    fn upsert(&self, summary: &DocumentSummary) -> Result<(), SinkError>;
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: DashMap<AccessKey, DocumentSummary>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AccessKey) -> Option<DocumentSummary> {
        self.documents.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Every stored summary, in NSU order.
    pub fn summaries(&self) -> Vec<DocumentSummary> {
        let mut all: Vec<DocumentSummary> =
            self.documents.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.nsu);
        all
    }
}

impl DocumentSink for MemorySink {
    fn upsert(&self, summary: &DocumentSummary) -> Result<(), SinkError> {
        self.documents
            .insert(summary.access_key.clone(), summary.clone());
        Ok(())
    }
}

/// Append-only JSON Lines file, one summary per line.
///
/// The last line for an access key wins. Upserting a summary identical to
/// the current one for its key writes nothing, so replays leave the file
/// unchanged.
///
/// Each line is written with a single `write_all` and flushed with
/// `sync_data`; a write that fails midway is truncated back off the file.
/// A process killed mid-write can still leave an unterminated last line,
/// which [`JsonLinesSink::open`] truncates. A complete line that does not
/// parse is an error.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    current: Mutex<HashMap<AccessKey, DocumentSummary>>,
}

impl JsonLinesSink {
    /// Open (or create on first write) the file at `path`, indexing any
    /// lines already present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let mut bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(io_error(&path, source)),
        };

        let complete = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        if complete < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - complete,
                "truncating unterminated last line left by an interrupted write"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|source| io_error(&path, source))?;
            file.set_len(complete as u64)
                .and_then(|()| file.sync_data())
                .map_err(|source| io_error(&path, source))?;
            bytes.truncate(complete);
        }

        let mut current = HashMap::new();
        for line in bytes.split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let summary: DocumentSummary = serde_json::from_slice(line)?;
            current.insert(summary.access_key.clone(), summary);
        }
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct access keys in the file.
    pub fn len(&self) -> usize {
        self.current.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_empty()
    }
}

impl DocumentSink for JsonLinesSink {
    fn upsert(&self, summary: &DocumentSummary) -> Result<(), SinkError> {
        let mut current = self.current.lock();
        if current.get(&summary.access_key) == Some(summary) {
            return Ok(());
        }

        let mut line = serde_json::to_vec(summary)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| io_error(&self.path, source))?;
        let start = file
            .metadata()
            .map_err(|source| io_error(&self.path, source))?
            .len();
        if let Err(source) = file.write_all(&line).and_then(|()| file.sync_data()) {
            if let Err(e) = file.set_len(start) {
                tracing::warn!(
                    path = %self.path.display(),
                    "could not remove partial line after failed write: {e}"
                );
            }
            return Err(io_error(&self.path, source));
        }

        current.insert(summary.access_key.clone(), summary.clone());
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}
