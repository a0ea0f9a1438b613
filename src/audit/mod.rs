//! Signed decision records (SDRs).
//!
//! Every channel invocation produces exactly one [`AuditRecord`]. The record
//! hash is the hex SHA-256 of the JSON object
//! `{decision, actor, resource, timestamp}`. With chaining enabled the
//! previous record's hash is added to that object as `previousHash`, so
//! deleting or reordering records breaks [`verify_chain`].
//!
//! Records are hashed, not signed. Production deployments are expected to
//! sign the hash with a hardware-backed key.

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::decision::Decision;

pub mod sink;

pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};

/// Audit errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Record could not be serialized for hashing or storage.
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Sink I/O failed.
    #[error("audit sink write failed: {0}")]
    Io(#[from] std::io::Error),
    /// Sink lock poisoned by a panicking writer.
    #[error("audit lock poisoned: {0}")]
    Poisoned(String),
    /// A line of a JSONL log is not a record.
    #[error("malformed audit record on line {line}: {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        reason: String,
    },
    /// Stored hash does not match the recomputed one.
    #[error("hash mismatch for record {id} at index {index}")]
    HashMismatch {
        /// Position in the verified slice.
        index: usize,
        /// Record id.
        id: Uuid,
    },
    /// `previousHash` does not point at the preceding record.
    #[error("hash chain broken at index {index} (record {id})")]
    BrokenLink {
        /// Position in the verified slice.
        index: usize,
        /// Record id.
        id: Uuid,
    },
}

/// Durable, append-only record of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Random record id.
    pub id: Uuid,
    /// Final decision for the request.
    pub decision: Decision,
    /// Caller subject, or `"system"` for rejected contexts.
    pub actor: String,
    /// Resource string as supplied by the caller.
    pub resource: String,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    /// Hash of the preceding record when chaining is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// Hex SHA-256 receipt.
    pub hash: String,
}

/// Hash input. Field order is significant.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SdrPayload<'a> {
    decision: &'a Decision,
    actor: &'a str,
    resource: &'a str,
    timestamp: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_hash: Option<&'a str>,
}

/// Compute the hex SHA-256 receipt for a record's fields.
///
/// # Errors
///
/// Fails only if the decision cannot be serialized.
pub fn sdr_hash(
    decision: &Decision,
    actor: &str,
    resource: &str,
    timestamp: &str,
    previous_hash: Option<&str>,
) -> Result<String, AuditError> {
    let payload = serde_json::to_vec(&SdrPayload {
        decision,
        actor,
        resource,
        timestamp,
        previous_hash,
    })?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// `true` when the stored hash matches the record's fields.
///
/// # Errors
///
/// Fails only on serialization errors.
pub fn verify_record(record: &AuditRecord) -> Result<bool, AuditError> {
    let expected = sdr_hash(
        &record.decision,
        &record.actor,
        &record.resource,
        &record.timestamp,
        record.previous_hash.as_deref(),
    )?;
    Ok(expected == record.hash)
}

/// Check every record hash, without looking at links.
///
/// # Errors
///
/// Returns [`AuditError::HashMismatch`] for the first tampered record.
pub fn verify_records(records: &[AuditRecord]) -> Result<(), AuditError> {
    for (index, record) in records.iter().enumerate() {
        if !verify_record(record)? {
            return Err(AuditError::HashMismatch {
                index,
                id: record.id,
            });
        }
    }
    Ok(())
}

/// Check every record hash and every link to the preceding record.
///
/// Links are checked from the first record carrying `previousHash` onward,
/// so a log that was written unchained and later switched to chaining still
/// verifies. Once the chain has started, a record without a link is a
/// [`AuditError::BrokenLink`]. The first record's link is not checked, so a
/// verified slice may start anywhere in a longer log. Truncation of the tail
/// is not detectable.
///
/// # Errors
///
/// Returns the first [`AuditError::HashMismatch`] or [`AuditError::BrokenLink`].
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), AuditError> {
    let mut previous: Option<&AuditRecord> = None;
    let mut chain_started = false;
    for (index, record) in records.iter().enumerate() {
        if !verify_record(record)? {
            return Err(AuditError::HashMismatch {
                index,
                id: record.id,
            });
        }
        match (&record.previous_hash, previous) {
            (Some(link), Some(prev)) if *link != prev.hash => {
                return Err(AuditError::BrokenLink {
                    index,
                    id: record.id,
                });
            }
            (None, _) if chain_started => {
                return Err(AuditError::BrokenLink {
                    index,
                    id: record.id,
                });
            }
            _ => {}
        }
        chain_started |= record.previous_hash.is_some();
        previous = Some(record);
    }
    Ok(())
}

/// Outcome of verifying a whole audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSummary {
    /// Records read and verified.
    pub records: usize,
    /// Records carrying a `previousHash` link.
    pub linked: usize,
}

impl LogSummary {
    /// `true` when at least one record is part of a hash chain.
    pub fn is_chained(&self) -> bool {
        self.linked > 0
    }
}

/// Read a JSONL audit log and verify every hash and every chain link.
///
/// # Errors
///
/// Fails if the log cannot be read, a line is malformed, or verification
/// finds a tampered or missing record.
pub fn verify_log_file(path: &Path) -> Result<LogSummary, AuditError> {
    let records = read_jsonl_log(path)?;
    verify_chain(&records)?;
    Ok(LogSummary {
        records: records.len(),
        linked: records.iter().filter(|r| r.previous_hash.is_some()).count(),
    })
}

/// Read every record from a JSON-lines audit log. Blank lines are skipped.
///
/// # Errors
///
/// Fails if the file cannot be read or a line is not a record.
pub fn read_jsonl_log(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| AuditError::Malformed {
            line: n.saturating_add(1),
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Builds, hashes and appends decision records.
pub struct Audit {
    sink: Arc<dyn AuditSink>,
    /// Last appended hash. `None` when chaining is off.
    chain_head: Option<Mutex<Option<String>>>,
}

impl Audit {
    /// Unchained audit writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            chain_head: None,
        }
    }

    /// Chained audit writing to `sink`, continuing after `head` (the hash of
    /// the last record already in the log, if any).
    ///
    /// Appends are serialized so that links follow append order.
    pub fn chained(sink: Arc<dyn AuditSink>, head: Option<String>) -> Self {
        Self {
            sink,
            chain_head: Some(Mutex::new(head)),
        }
    }

    /// Whether records are linked to their predecessor.
    pub fn is_chained(&self) -> bool {
        self.chain_head.is_some()
    }

    /// Stamp, hash and append a record. Returns the hash as receipt.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be serialized or the sink rejects it. A
    /// rejected record does not advance the chain.
    pub async fn create_signed_sdr(
        &self,
        decision: &Decision,
        actor: &str,
        resource: &str,
    ) -> Result<String, AuditError> {
        match &self.chain_head {
            None => self.append(decision, actor, resource, None).await,
            Some(head) => {
                let mut head = head.lock().await;
                let hash = self
                    .append(decision, actor, resource, head.clone())
                    .await?;
                *head = Some(hash.clone());
                Ok(hash)
            }
        }
    }

    async fn append(
        &self,
        decision: &Decision,
        actor: &str,
        resource: &str,
        previous_hash: Option<String>,
    ) -> Result<String, AuditError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let hash = sdr_hash(
            decision,
            actor,
            resource,
            &timestamp,
            previous_hash.as_deref(),
        )?;
        let record = AuditRecord {
            id: Uuid::new_v4(),
            decision: decision.clone(),
            actor: actor.to_owned(),
            resource: resource.to_owned(),
            timestamp,
            previous_hash,
            hash: hash.clone(),
        };
        self.sink.append(&record).await?;
        debug!(record_id = %record.id, actor, hash = %hash, "decision record appended");
        Ok(hash)
    }
}
