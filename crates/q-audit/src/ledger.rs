// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Audit ledger
//!
//! # Append path
//!
//! ```text
//! caller thread                         | under `state` lock (O(1))
//! --------------------------------------+-------------------------------
//! filter (non-critical only)            |
//! DEFLATE payload above threshold       |
//! SHA3-256 of stored payload            |
//!                                       | seq = next_seq++
//!                                       | ts  = clock.now()
//!                                       | mac = HMAC(seq|ts|class|hash)
//!                                       | main.push(record)
//!                                       |   evicted critical -> reserve
//! notify observers                      |
//! ```
//!
//! The main ring always holds a contiguous run of sequence numbers. The
//! reserve ring only ever receives records displaced from the front of the
//! main ring, so every reserved record is older than every main record and
//! a flush drains reserve first, then main.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use parking_lot::{Mutex, RwLock};
use q_common::config::AuditConfig;
use q_common::{Clock, CoreConfig, Error, Result};
use q_crypto::{constant_time_eq, sha3_256, RecordMac, SecureBuffer};

use crate::filter::IngestFilter;
use crate::record::{
    AuditClass, AuditClassMask, AuditEvent, AuditRecord, EventCode, Severity, MAX_PAYLOAD,
};
use crate::ring::Ring;
use crate::sink::LogSink;

/// Receives records after they have been committed
pub trait AuditObserver: Send + Sync {
    /// Called once per matching record, outside the ledger lock
    fn notify(&self, record: &AuditRecord);
}

impl<F> AuditObserver for F
where
    F: Fn(&AuditRecord) + Send + Sync,
{
    fn notify(&self, record: &AuditRecord) {
        self(record);
    }
}

struct Subscription {
    classes: AuditClassMask,
    min_severity: Severity,
    observer: Arc<dyn AuditObserver>,
}

struct LedgerState {
    next_sequence: u64,
    main: Ring<Arc<AuditRecord>>,
    reserve: Ring<Arc<AuditRecord>>,
}

#[derive(Default)]
struct Counters {
    total_appended: AtomicU64,
    dropped: [AtomicU64; 4],
    evicted: AtomicU64,
    lost_unflushed: AtomicU64,
    main_len: AtomicU64,
    reserved_len: AtomicU64,
    flushed_through: AtomicU64,
    in_flight_through: AtomicU64,
    in_flight_evicted: AtomicU64,
}

/// Point-in-time ledger statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct LedgerStats {
    /// Records that received a sequence number
    pub total_appended: u64,
    /// Records dropped by the filter, per class (see [`AuditClass::index`])
    pub dropped: [u64; 4],
    /// Records no longer retained by either ring
    pub evicted: u64,
    /// Evicted records that had not reached the sink; always zero without
    /// a sink
    pub lost_unflushed: u64,
    /// Records in the main ring
    pub main_len: u64,
    /// Records in the reserve ring
    pub reserved_len: u64,
    /// Main ring capacity
    pub capacity: u64,
    /// Reserve ring capacity
    pub reserved_capacity: u64,
    /// Highest sequence number handed to the sink
    pub flushed_through: u64,
}

impl LedgerStats {
    /// Drops for one class
    #[must_use]
    pub const fn dropped_for(&self, class: AuditClass) -> u64 {
        self.dropped[class.index()]
    }

    /// Drops across all classes
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.iter().sum()
    }

    /// Main ring fill level, 0..=100
    #[must_use]
    pub fn fill_percent(&self) -> u8 {
        fill_percent(self.main_len, self.capacity)
    }
}

fn fill_percent(len: u64, capacity: u64) -> u8 {
    if capacity == 0 {
        return 100;
    }
    u8::try_from((len.saturating_mul(100) / capacity).min(100)).unwrap_or(100)
}

/// Append-only, sequence-ordered, MAC-sealed audit ledger
pub struct AuditLedger {
    mac: RecordMac,
    clock: Arc<dyn Clock>,
    compress_threshold: usize,
    lock_timeout: Duration,
    capacity: u64,
    reserved_capacity: u64,
    state: Mutex<LedgerState>,
    flush_lock: Mutex<()>,
    filter: RwLock<IngestFilter>,
    sink: Option<Arc<dyn LogSink>>,
    observers: RwLock<Vec<Subscription>>,
    counters: Counters,
}

impl AuditLedger {
    /// Create a ledger sealing records with `key`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the capacity is zero or the
    /// reserve does not leave room in the main ring.
    pub fn new(config: &AuditConfig, key: &SecureBuffer<32>, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.capacity == 0 || config.reserved >= config.capacity {
            return Err(Error::InvalidParameter);
        }
        let mac = RecordMac::new(key)?;
        let capacity = u64::try_from(config.capacity).map_err(|_| Error::InvalidParameter)?;
        let reserved_capacity =
            u64::try_from(config.reserved).map_err(|_| Error::InvalidParameter)?;

        Ok(Self {
            mac,
            clock,
            compress_threshold: config.compress_threshold,
            lock_timeout: CoreConfig::DEFAULT.lock_timeout(),
            capacity,
            reserved_capacity,
            state: Mutex::new(LedgerState {
                next_sequence: 1,
                main: Ring::with_capacity(config.capacity),
                reserve: Ring::with_capacity(config.reserved),
            }),
            flush_lock: Mutex::new(()),
            filter: RwLock::new(IngestFilter::from_config(config)),
            sink: None,
            observers: RwLock::new(Vec::new()),
            counters: Counters::default(),
        })
    }

    /// Attach the durable sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Bound every internal lock acquisition by `timeout`
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Whether a sink is attached
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Replace the ingestion filter
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the filter lock cannot be taken in time.
    pub fn set_filter(&self, filter: IngestFilter) -> Result<()> {
        *self.filter.try_write_for(self.lock_timeout).ok_or(Error::Busy)? = filter;
        Ok(())
    }

    /// Current ingestion filter
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the filter lock cannot be taken in time.
    pub fn filter(&self) -> Result<IngestFilter> {
        Ok(*self.filter.try_read_for(self.lock_timeout).ok_or(Error::Busy)?)
    }

    /// Register an observer for records matching `classes` at or above
    /// `min_severity`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the observer list is locked.
    pub fn subscribe(
        &self,
        classes: AuditClassMask,
        min_severity: Severity,
        observer: Arc<dyn AuditObserver>,
    ) -> Result<()> {
        self.observers
            .try_write_for(self.lock_timeout)
            .ok_or(Error::Busy)?
            .push(Subscription {
                classes,
                min_severity,
                observer,
            });
        Ok(())
    }

    /// Append an event
    ///
    /// Critical events (Security class at Error or above) take the
    /// [`append_critical`](Self::append_critical) path. Others may be dropped
    /// by the filter, in which case `Ok(None)` is returned and the class drop
    /// counter is incremented.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the stored payload exceeds [`MAX_PAYLOAD`]
    /// - [`Error::Busy`] if the ledger lock cannot be taken in time
    pub fn append(&self, event: AuditEvent) -> Result<Option<u64>> {
        if event.is_critical() {
            return self.append_critical(event).map(Some);
        }

        let fill = fill_percent(self.counters.main_len.load(Ordering::Relaxed), self.capacity);
        if !self.filter()?.admits(&event, fill) {
            self.counters.dropped[event.class.index()].fetch_add(1, Ordering::Relaxed);
            tracing::trace!(class = ?event.class, code = ?event.code, "audit record filtered");
            return Ok(None);
        }

        let record = self.commit(event, false)?;
        Ok(Some(record.sequence))
    }

    /// Append an event that must not be filtered or starved
    ///
    /// The record bypasses the filter and, once displaced from the main
    /// ring, is retained in the reserve ring.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the stored payload exceeds [`MAX_PAYLOAD`]
    /// - [`Error::Busy`] if the ledger lock cannot be taken in time
    pub fn append_critical(&self, event: AuditEvent) -> Result<u64> {
        self.commit(event, true).map(|record| record.sequence)
    }

    /// Append an event that the filter must not drop
    ///
    /// Unlike [`append_critical`](Self::append_critical) the record is only
    /// retained in the reserve ring if the event itself is critical.
    ///
    /// # Errors
    ///
    /// Same as [`append_critical`](Self::append_critical).
    pub fn append_unfiltered(&self, event: AuditEvent) -> Result<u64> {
        let critical = event.is_critical();
        self.commit(event, critical).map(|record| record.sequence)
    }

    fn commit(&self, event: AuditEvent, critical: bool) -> Result<Arc<AuditRecord>> {
        let AuditEvent {
            class,
            severity,
            code,
            correlation,
            payload,
        } = event;

        let original_len = u32::try_from(payload.len()).map_err(|_| Error::InvalidParameter)?;
        let (payload, compressed) = self.encode_payload(payload)?;
        if payload.len() > MAX_PAYLOAD {
            tracing::warn!(len = payload.len(), "audit payload exceeds stored limit");
            return Err(Error::InvalidParameter);
        }
        let payload_hash = sha3_256(&payload);

        let record = {
            let mut state = self.state.try_lock_for(self.lock_timeout).ok_or(Error::Busy)?;
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let timestamp = self.clock.now();
            let header = AuditRecord::mac_header(sequence, timestamp, class, &payload_hash);
            let record = Arc::new(AuditRecord {
                sequence,
                timestamp,
                class,
                severity,
                code,
                correlation,
                compressed,
                original_len,
                payload,
                payload_hash,
                mac: self.mac.compute(&[&header]),
                critical,
            });
            if let Some(evicted) = state.main.push(Arc::clone(&record)) {
                self.displace(&mut state, evicted);
            }
            self.counters.total_appended.fetch_add(1, Ordering::Relaxed);
            self.counters.main_len.store(state.main.len() as u64, Ordering::Relaxed);
            self.counters.reserved_len.store(state.reserve.len() as u64, Ordering::Relaxed);
            record
        };

        self.notify(&record);
        Ok(record)
    }

    fn encode_payload(&self, payload: Vec<u8>) -> Result<(Vec<u8>, bool)> {
        if payload.len() <= self.compress_threshold {
            return Ok((payload, false));
        }
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).map_err(|_| Error::InvalidParameter)?;
        let deflated = encoder.finish().map_err(|_| Error::InvalidParameter)?;
        if deflated.len() < payload.len() {
            Ok((deflated, true))
        } else {
            Ok((payload, false))
        }
    }

    fn displace(&self, state: &mut LedgerState, evicted: Arc<AuditRecord>) {
        let gone = if evicted.critical {
            state.reserve.push(evicted)
        } else {
            Some(evicted)
        };
        let Some(gone) = gone else {
            return;
        };
        let c = &self.counters;
        c.evicted.fetch_add(1, Ordering::Relaxed);
        if self.sink.is_none() || gone.sequence <= c.flushed_through.load(Ordering::Acquire) {
            return;
        }
        // Settled by `flush` once the sink write for this record completes
        if gone.sequence <= c.in_flight_through.load(Ordering::Acquire) {
            c.in_flight_evicted.fetch_add(1, Ordering::Relaxed);
        } else {
            c.lost_unflushed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn notify(&self, record: &AuditRecord) {
        let Some(observers) = self.observers.try_read_for(self.lock_timeout) else {
            tracing::warn!(sequence = record.sequence, "audit observers busy, notification skipped");
            return;
        };
        for sub in observers.iter() {
            if sub.classes.contains(record.class) && record.severity >= sub.min_severity {
                sub.observer.notify(record);
            }
        }
    }

    /// Hand every unflushed record to the sink, oldest first
    ///
    /// Returns the number of records written. Records evicted while their
    /// batch is being written count as lost only if the write fails.
    ///
    /// # Errors
    ///
    /// - [`Error::Unavailable`] if no sink is attached or the sink fails
    /// - [`Error::Busy`] if another flush or the ledger lock holds too long
    #[tracing::instrument(skip(self))]
    pub fn flush(&self) -> Result<usize> {
        let sink = self.sink.as_ref().ok_or(Error::Unavailable)?;
        let _flushing = self.flush_lock.try_lock_for(self.lock_timeout).ok_or(Error::Busy)?;

        let watermark = self.counters.flushed_through.load(Ordering::Acquire);
        let batch: Vec<Arc<AuditRecord>> = {
            let state = self.state.try_lock_for(self.lock_timeout).ok_or(Error::Busy)?;
            let batch: Vec<_> = state
                .reserve
                .iter()
                .chain(state.main.iter())
                .filter(|r| r.sequence > watermark)
                .cloned()
                .collect();
            if let Some(last) = batch.last() {
                self.counters.in_flight_through.store(last.sequence, Ordering::Release);
            }
            batch
        };
        let Some(last) = batch.last().map(|r| r.sequence) else {
            return Ok(0);
        };

        let written = sink.write(&batch);

        // Settle in-flight evictions under the state lock
        let state = self.state.lock();
        let c = &self.counters;
        let evicted_in_flight = c.in_flight_evicted.swap(0, Ordering::Relaxed);
        c.in_flight_through.store(0, Ordering::Release);
        match written {
            Ok(()) => c.flushed_through.store(last, Ordering::Release),
            Err(_) => {
                c.lost_unflushed.fetch_add(evicted_in_flight, Ordering::Relaxed);
            }
        }
        drop(state);

        written.map_err(|e| {
            tracing::error!(error = %e, records = batch.len(), "audit flush failed");
            e
        })?;
        tracing::debug!(records = batch.len(), through = last, "audit flushed");
        Ok(batch.len())
    }

    /// Lock-free statistics snapshot
    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        let c = &self.counters;
        LedgerStats {
            total_appended: c.total_appended.load(Ordering::Relaxed),
            dropped: [
                c.dropped[0].load(Ordering::Relaxed),
                c.dropped[1].load(Ordering::Relaxed),
                c.dropped[2].load(Ordering::Relaxed),
                c.dropped[3].load(Ordering::Relaxed),
            ],
            evicted: c.evicted.load(Ordering::Relaxed),
            lost_unflushed: c.lost_unflushed.load(Ordering::Relaxed),
            main_len: c.main_len.load(Ordering::Relaxed),
            reserved_len: c.reserved_len.load(Ordering::Relaxed),
            capacity: self.capacity,
            reserved_capacity: self.reserved_capacity,
            flushed_through: c.flushed_through.load(Ordering::Acquire),
        }
    }

    /// Retained record with sequence number `sequence`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the ledger lock cannot be taken in time.
    pub fn get(&self, sequence: u64) -> Result<Option<Arc<AuditRecord>>> {
        let state = self.state.try_lock_for(self.lock_timeout).ok_or(Error::Busy)?;
        if let Some(first) = state.main.front().map(|r| r.sequence) {
            if sequence >= first {
                let offset = usize::try_from(sequence - first).map_err(|_| Error::InvalidParameter)?;
                return Ok(state.main.get(offset).cloned());
            }
        }
        let found = state.reserve.iter().find(|r| r.sequence == sequence).cloned();
        Ok(found)
    }

    /// Every retained record, in sequence order
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the ledger lock cannot be taken in time.
    pub fn records(&self) -> Result<Vec<Arc<AuditRecord>>> {
        let state = self.state.try_lock_for(self.lock_timeout).ok_or(Error::Busy)?;
        Ok(state.reserve.iter().chain(state.main.iter()).cloned().collect())
    }

    /// Check a record's payload hash and MAC
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] if either does not match.
    pub fn verify_record(&self, record: &AuditRecord) -> Result<()> {
        let hash_ok = constant_time_eq(sha3_256(&record.payload).as_bytes(), record.payload_hash.as_bytes());
        let mac_ok = self.mac.verify(&[&record.header()], &record.mac);
        if hash_ok && mac_ok {
            Ok(())
        } else {
            tracing::error!(sequence = record.sequence, "audit record failed verification");
            Err(Error::IntegrityViolation)
        }
    }
}

impl core::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("capacity", &self.capacity)
            .field("reserved_capacity", &self.reserved_capacity)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

/// Record `err` and hand it back for propagation
///
/// [`Error::Permission`] and [`Error::IntegrityViolation`] are always
/// recorded as Security-class critical records. Other errors are appended
/// through the filter under `class`. A failure to record is logged; it never
/// replaces `err`.
pub fn audit_error(
    ledger: &AuditLedger,
    err: Error,
    class: AuditClass,
    code: EventCode,
    correlation: u64,
) -> Error {
    let payload = err.code().to_le_bytes();
    let outcome = match err {
        Error::Permission | Error::IntegrityViolation => {
            let severity = if err == Error::IntegrityViolation {
                Severity::Critical
            } else {
                Severity::Error
            };
            let event = AuditEvent::new(AuditClass::Security, severity, code)
                .with_correlation(correlation)
                .with_payload(payload);
            ledger.append_critical(event).map(Some)
        }
        _ => {
            let event = AuditEvent::new(class, Severity::Warning, code)
                .with_correlation(correlation)
                .with_payload(payload);
            ledger.append(event)
        }
    };
    if let Err(audit_err) = outcome {
        tracing::error!(error = %err, audit_error = %audit_err, "failed to record error");
    }
    err
}
