//! Audit sinks.
//!
//! The sink is the only shared mutable resource in the system. Both
//! implementations serialize appends behind a lock.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AuditError, AuditRecord};

/// Durable, append-only destination for decision records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Must be safe to call concurrently.
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Sink keeping records in memory, for tests and embedding.
pub struct MemoryAuditSink {
    records: tokio::sync::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self {
            records: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every record in append order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Number of records appended.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// `true` when nothing was appended yet.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Sink writing one JSON record per line to an append-only writer.
///
/// Writes and flushes run on the blocking pool.
pub struct JsonlAuditSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonlAuditSink {
    /// Append to the file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Sink over an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> Result<(), AuditError> {
            let mut writer = writer
                .lock()
                .map_err(|e| AuditError::Poisoned(e.to_string()))?;
            writeln!(writer, "{line}")?;
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| AuditError::Io(std::io::Error::other(e.to_string())))?
    }
}
