// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Durable sinks for flushed records
//!
//! The ledger hands each flush batch to a [`LogSink`] in sequence order. A
//! batch either lands in full or the call fails; the ledger only advances
//! its flush watermark after success.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use q_common::{Error, Result};

use crate::record::AuditRecord;

/// Durable destination for audit records
pub trait LogSink: Send + Sync {
    /// Persist `records`, oldest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the destination cannot be written.
    fn write(&self, records: &[Arc<AuditRecord>]) -> Result<()>;
}

/// In-memory sink, for simulation and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Records written so far
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Sequence numbers written so far
    #[must_use]
    pub fn sequences(&self) -> Vec<u64> {
        self.records.lock().iter().map(|r| r.sequence).collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, records: &[Arc<AuditRecord>]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable);
        }
        self.records
            .lock()
            .extend(records.iter().map(|r| AuditRecord::clone(r)));
        Ok(())
    }
}

/// Append-only JSON-lines sink
pub struct FileSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl FileSink {
    /// Append to the file at `path`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| {
                tracing::error!(path = %path.as_ref().display(), error = %e, "audit sink open failed");
                Error::Unavailable
            })?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Write to an arbitrary writer
    #[must_use]
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl core::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileSink").finish_non_exhaustive()
    }
}

impl LogSink for FileSink {
    fn write(&self, records: &[Arc<AuditRecord>]) -> Result<()> {
        let mut batch = Vec::new();
        for record in records {
            serde_json::to_writer(&mut batch, record.as_ref()).map_err(|_| Error::Unavailable)?;
            batch.push(b'\n');
        }
        let mut writer = self.writer.lock();
        writer.write_all(&batch).map_err(|e| {
            tracing::error!(error = %e, "audit sink write failed");
            Error::Unavailable
        })?;
        writer.flush().map_err(|_| Error::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuditClass, EventCode, Severity};
    use q_common::Timestamp;
    use q_crypto::sha3_256;

    fn record(sequence: u64) -> Arc<AuditRecord> {
        Arc::new(AuditRecord {
            sequence,
            timestamp: Timestamp::from_millis(sequence),
            class: AuditClass::System,
            severity: Severity::Info,
            code: EventCode::CoreStarted,
            correlation: 0,
            compressed: false,
            original_len: 0,
            payload: Vec::new(),
            payload_hash: sha3_256(&[]),
            mac: [0; 32],
            critical: false,
        })
    }

    #[test]
    fn test_memory_sink_failure() {
        let sink = MemorySink::new();
        sink.write(&[record(1)]).unwrap();
        sink.set_failing(true);
        assert_eq!(sink.write(&[record(2)]), Err(Error::Unavailable));
        assert_eq!(sink.sequences(), vec![1]);
    }

    #[test]
    fn test_file_sink_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileSink::open(&path).unwrap();
        sink.write(&[record(1), record(2)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.sequence, 2);
        assert_eq!(parsed.payload_hash, sha3_256(&[]));
    }
}
