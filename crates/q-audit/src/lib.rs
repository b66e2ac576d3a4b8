// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Audit Ledger for Qbitel TrustCore
//!
//! Every security decision taken by the trust core lands here as an
//! [`AuditRecord`]:
//!
//! - **Total order**: one global sequence number, assigned under the ledger lock
//! - **Sealed**: HMAC-SHA3-256 over sequence, timestamp, class and payload hash
//! - **Bounded**: fixed main ring plus a reserve ring for critical records
//! - **Durable on demand**: [`AuditLedger::flush`] hands pending records to a [`LogSink`]
//!
//! # Security
//!
//! Permission and integrity failures go through
//! [`AuditLedger::append_critical`], which bypasses the ingestion filter and
//! is retained through the reserve ring, so low-severity floods cannot push
//! them out before they are flushed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod filter;
pub mod layout;
pub mod ledger;
pub mod record;
pub mod ring;
pub mod sink;

pub use filter::IngestFilter;
pub use ledger::{audit_error, AuditLedger, AuditObserver, LedgerStats};
pub use record::{
    AuditClass, AuditClassMask, AuditEvent, AuditRecord, EventCode, Severity, MAX_PAYLOAD,
};
pub use sink::{FileSink, LogSink, MemorySink};
