// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persisted ledger layout
//!
//! Fixed header followed by fixed-size records, so an export can be mapped
//! and indexed directly. All integers are little-endian.
//!
//! ## Header (88 bytes)
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | Magic "QAUD"                            |
//! | 4      | 2    | Layout version                          |
//! | 6      | 2    | Reserved                                |
//! | 8      | 4    | Record count                            |
//! | 12     | 4    | Record size                             |
//! | 16     | 8    | First sequence number                   |
//! | 24     | 64   | SHA3-512 over all record bytes          |
//!
//! ## Record (4200 bytes)
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 8    | Sequence                                |
//! | 8      | 8    | Timestamp (ms)                          |
//! | 16     | 1    | Class                                   |
//! | 17     | 1    | Severity                                |
//! | 18     | 1    | Flags (bit 0 compressed, bit 1 critical)|
//! | 19     | 1    | Padding                                 |
//! | 20     | 2    | Event code                              |
//! | 22     | 2    | Padding                                 |
//! | 24     | 8    | Correlation id                          |
//! | 32     | 4    | Original payload length                 |
//! | 36     | 4    | Stored payload length                   |
//! | 40     | 32   | Payload hash                            |
//! | 72     | 32   | MAC                                     |
//! | 104    | 4096 | Payload, zero-padded                    |

use std::sync::Arc;

use q_common::{Error, Result, Timestamp};
use q_crypto::{constant_time_eq, sha3_512, Digest256};

use crate::ledger::AuditLedger;
use crate::record::{AuditClass, AuditRecord, EventCode, Severity, MAX_PAYLOAD};

/// Export magic
pub const MAGIC: [u8; 4] = *b"QAUD";
/// Export layout version
pub const LAYOUT_VERSION: u16 = 1;
/// Header size in bytes
pub const HEADER_SIZE: usize = 88;
/// Record size in bytes
pub const RECORD_SIZE: usize = 104 + MAX_PAYLOAD;

const FLAG_COMPRESSED: u8 = 0x01;
const FLAG_CRITICAL: u8 = 0x02;

fn encode_record(record: &AuditRecord, out: &mut Vec<u8>) -> Result<()> {
    let stored_len = u32::try_from(record.payload.len()).map_err(|_| Error::InvalidParameter)?;
    if record.payload.len() > MAX_PAYLOAD {
        return Err(Error::InvalidParameter);
    }
    let mut flags = 0u8;
    if record.compressed {
        flags |= FLAG_COMPRESSED;
    }
    if record.critical {
        flags |= FLAG_CRITICAL;
    }

    out.extend_from_slice(&record.sequence.to_le_bytes());
    out.extend_from_slice(&record.timestamp.as_millis().to_le_bytes());
    out.extend_from_slice(&[record.class as u8, record.severity as u8, flags, 0]);
    out.extend_from_slice(&(record.code as u16).to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&record.correlation.to_le_bytes());
    out.extend_from_slice(&record.original_len.to_le_bytes());
    out.extend_from_slice(&stored_len.to_le_bytes());
    out.extend_from_slice(record.payload_hash.as_bytes());
    out.extend_from_slice(&record.mac);
    out.extend_from_slice(&record.payload);
    out.resize(out.len() + MAX_PAYLOAD - record.payload.len(), 0);
    Ok(())
}

fn le_u16(bytes: &[u8], at: usize) -> Result<u16> {
    let raw = bytes.get(at..at + 2).ok_or(Error::InvalidParameter)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn le_u32(bytes: &[u8], at: usize) -> Result<u32> {
    let raw: [u8; 4] = bytes
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidParameter)?;
    Ok(u32::from_le_bytes(raw))
}

fn le_u64(bytes: &[u8], at: usize) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidParameter)?;
    Ok(u64::from_le_bytes(raw))
}

fn decode_record(bytes: &[u8]) -> Result<AuditRecord> {
    let class = AuditClass::from_bits(bytes[16]).ok_or(Error::InvalidParameter)?;
    let flags = bytes[18];
    let stored_len = usize::try_from(le_u32(bytes, 36)?).map_err(|_| Error::InvalidParameter)?;
    if stored_len > MAX_PAYLOAD {
        return Err(Error::InvalidParameter);
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[40..72]);
    let mut mac = [0u8; 32];
    mac.copy_from_slice(&bytes[72..104]);

    Ok(AuditRecord {
        sequence: le_u64(bytes, 0)?,
        timestamp: Timestamp::from_millis(le_u64(bytes, 8)?),
        class,
        severity: Severity::from(bytes[17]),
        code: EventCode::from(le_u16(bytes, 20)?),
        correlation: le_u64(bytes, 24)?,
        compressed: flags & FLAG_COMPRESSED != 0,
        original_len: le_u32(bytes, 32)?,
        payload: bytes[104..104 + stored_len].to_vec(),
        payload_hash: Digest256::from_bytes(hash),
        mac,
        critical: flags & FLAG_CRITICAL != 0,
    })
}

/// Serialize `records` in the persisted layout
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if a record does not fit the layout.
pub fn encode(records: &[Arc<AuditRecord>]) -> Result<Vec<u8>> {
    let count = u32::try_from(records.len()).map_err(|_| Error::InvalidParameter)?;
    let mut body = Vec::with_capacity(records.len() * RECORD_SIZE);
    for record in records {
        encode_record(record, &mut body)?;
    }
    let digest = sha3_512(&body);

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&LAYOUT_VERSION.to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&count.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&records.first().map_or(0, |r| r.sequence).to_le_bytes());
    out.extend_from_slice(digest.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse a persisted export
///
/// Record MACs are not checked here; pass the records to
/// [`AuditLedger::verify_record`] on a ledger holding the key.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] if the header or a record is malformed
/// - [`Error::IntegrityViolation`] if the record digest does not match
pub fn decode(bytes: &[u8]) -> Result<Vec<AuditRecord>> {
    if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC {
        return Err(Error::InvalidParameter);
    }
    if le_u16(bytes, 4)? != LAYOUT_VERSION {
        return Err(Error::InvalidParameter);
    }
    let count = usize::try_from(le_u32(bytes, 8)?).map_err(|_| Error::InvalidParameter)?;
    let record_size = usize::try_from(le_u32(bytes, 12)?).map_err(|_| Error::InvalidParameter)?;
    if record_size != RECORD_SIZE {
        return Err(Error::InvalidParameter);
    }
    let body = &bytes[HEADER_SIZE..];
    if Some(body.len()) != count.checked_mul(RECORD_SIZE) {
        return Err(Error::InvalidParameter);
    }
    if !constant_time_eq(sha3_512(body).as_bytes(), &bytes[24..HEADER_SIZE]) {
        tracing::error!("audit export digest mismatch");
        return Err(Error::IntegrityViolation);
    }

    let records = body
        .chunks_exact(RECORD_SIZE)
        .map(decode_record)
        .collect::<Result<Vec<_>>>()?;
    if records.first().map_or(0, |r| r.sequence) != le_u64(bytes, 16)? {
        return Err(Error::InvalidParameter);
    }
    Ok(records)
}

impl AuditLedger {
    /// Serialize every retained record in the persisted layout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the ledger lock cannot be taken in time.
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.records()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_crypto::sha3_256;

    fn record(sequence: u64, payload: &[u8]) -> Arc<AuditRecord> {
        Arc::new(AuditRecord {
            sequence,
            timestamp: Timestamp::from_millis(1000 + sequence),
            class: AuditClass::Hardware,
            severity: Severity::Warning,
            code: EventCode::DmaDenied,
            correlation: 77,
            compressed: false,
            original_len: u32::try_from(payload.len()).unwrap(),
            payload: payload.to_vec(),
            payload_hash: sha3_256(payload),
            mac: [0x5A; 32],
            critical: true,
        })
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(RECORD_SIZE, 4200);
        let bytes = encode(&[record(3, b"abc")]).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + RECORD_SIZE);
        assert_eq!(&bytes[0..4], b"QAUD");
    }

    #[test]
    fn test_decode_preserves_fields() {
        let original = record(3, b"dma");
        let decoded = decode(&encode(&[original.clone(), record(4, b"")]).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], *original);
        assert_eq!(decoded[1].sequence, 4);
    }

    #[test]
    fn test_tampered_body_detected() {
        let mut bytes = encode(&[record(1, b"x")]).unwrap();
        bytes[HEADER_SIZE + 104] ^= 0x01;
        assert_eq!(decode(&bytes), Err(Error::IntegrityViolation));
    }

    #[test]
    fn test_truncated_export_rejected() {
        let bytes = encode(&[record(1, b"x")]).unwrap();
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Err(Error::InvalidParameter));
        assert_eq!(decode(&bytes[..10]), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_empty_export() {
        let bytes = encode(&[]).unwrap();
        assert!(decode(&bytes).unwrap().is_empty());
    }
}
