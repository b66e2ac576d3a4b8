// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Measurement log
//!
//! Bounded, append-only sequence of [`Measurement`]s with an integrity hash
//! over every entry: `SHA3-512(enc(m1) | enc(m2) | ... | enc(mN))`. The hash
//! is recomputed from scratch on each append.
//!
//! ## Persisted header (80 bytes)
//!
//! | Offset | Size | Field            |
//! |--------|------|------------------|
//! | 0      | 4    | Magic "QMLG"     |
//! | 4      | 2    | Layout version   |
//! | 6      | 2    | Reserved         |
//! | 8      | 4    | Entry count      |
//! | 12     | 4    | Entry size       |
//! | 16     | 64   | Integrity hash   |
//!
//! followed by `count` entries of [`MEASUREMENT_SIZE`] bytes.

use heapless::Vec;
use q_common::{Error, Result};
use q_crypto::hash::Sha3_512;
use q_crypto::{constant_time_eq, Digest512, Hash};

use crate::measurement::{Measurement, MEASUREMENT_SIZE};

/// Maximum number of measurements held by a log
pub const MAX_MEASUREMENTS: usize = 32;

/// Log magic
pub const LOG_MAGIC: [u8; 4] = *b"QMLG";
/// Log layout version
pub const LOG_VERSION: u16 = 1;
/// Persisted header size
pub const LOG_HEADER_SIZE: usize = 80;

/// Bounded measurement log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementLog {
    entries: Vec<Measurement, MAX_MEASUREMENTS>,
    integrity: Digest512,
}

impl MeasurementLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            integrity: Self::hash_entries(&[]),
        }
    }

    fn hash_entries(entries: &[Measurement]) -> Digest512 {
        let mut hasher = Sha3_512::new();
        for entry in entries {
            hasher.update(&entry.encode());
        }
        hasher.finalize()
    }

    /// Append a measurement and refresh the integrity hash
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the log is full.
    pub fn push(&mut self, measurement: Measurement) -> Result<()> {
        self.entries
            .push(measurement)
            .map_err(|_| Error::ResourceExhausted)?;
        self.integrity = Self::hash_entries(&self.entries);
        Ok(())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free entries
    #[must_use]
    pub fn remaining(&self) -> usize {
        MAX_MEASUREMENTS - self.entries.len()
    }

    /// Entries in append order
    #[must_use]
    pub fn entries(&self) -> &[Measurement] {
        &self.entries
    }

    /// Integrity hash over all entries
    #[must_use]
    pub const fn integrity_hash(&self) -> &Digest512 {
        &self.integrity
    }

    /// Serialize in the persisted layout
    #[must_use]
    pub fn to_bytes(&self) -> std::vec::Vec<u8> {
        let mut out = std::vec::Vec::with_capacity(LOG_HEADER_SIZE + self.len() * MEASUREMENT_SIZE);
        out.extend_from_slice(&LOG_MAGIC);
        out.extend_from_slice(&LOG_VERSION.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        #[allow(clippy::cast_possible_truncation)]
        {
            out.extend_from_slice(&(self.len() as u32).to_le_bytes());
            out.extend_from_slice(&(MEASUREMENT_SIZE as u32).to_le_bytes());
        }
        out.extend_from_slice(self.integrity.as_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.encode());
        }
        out
    }

    /// Parse the persisted layout
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] on a malformed header or entry
    /// - [`Error::IntegrityViolation`] if the stored hash does not match
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LOG_HEADER_SIZE || bytes[0..4] != LOG_MAGIC {
            return Err(Error::InvalidParameter);
        }
        if u16::from_le_bytes([bytes[4], bytes[5]]) != LOG_VERSION {
            return Err(Error::InvalidParameter);
        }
        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let size = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        if size != MEASUREMENT_SIZE || count > MAX_MEASUREMENTS {
            return Err(Error::InvalidParameter);
        }
        let body = &bytes[LOG_HEADER_SIZE..];
        if body.len() != count * MEASUREMENT_SIZE {
            return Err(Error::InvalidParameter);
        }

        let mut log = Self::new();
        for chunk in body.chunks_exact(MEASUREMENT_SIZE) {
            log.push(Measurement::decode(chunk)?)?;
        }
        if !constant_time_eq(log.integrity.as_bytes(), &bytes[16..LOG_HEADER_SIZE]) {
            tracing::error!(entries = count, "measurement log integrity mismatch");
            return Err(Error::IntegrityViolation);
        }
        Ok(log)
    }
}

impl Default for MeasurementLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_common::Timestamp;
    use q_crypto::{sha3_512, SIGNATURE_SIZE};

    fn entry(sequence: u64) -> Measurement {
        Measurement {
            register: 0,
            digest: sha3_512(&sequence.to_le_bytes()),
            signature: [0; SIGNATURE_SIZE],
            timestamp: Timestamp::from_millis(sequence),
            sequence,
        }
    }

    #[test]
    fn test_empty_hash_is_hash_of_nothing() {
        assert_eq!(*MeasurementLog::new().integrity_hash(), sha3_512(&[]));
    }

    #[test]
    fn test_hash_covers_all_entries() {
        let mut log = MeasurementLog::new();
        log.push(entry(1)).unwrap();
        log.push(entry(2)).unwrap();

        let mut concat = std::vec::Vec::new();
        concat.extend_from_slice(&entry(1).encode());
        concat.extend_from_slice(&entry(2).encode());
        assert_eq!(*log.integrity_hash(), sha3_512(&concat));
    }

    #[test]
    fn test_capacity() {
        let mut log = MeasurementLog::new();
        for i in 0..MAX_MEASUREMENTS as u64 {
            log.push(entry(i)).unwrap();
        }
        assert_eq!(log.remaining(), 0);
        assert_eq!(log.push(entry(99)), Err(Error::ResourceExhausted));
        assert_eq!(log.len(), MAX_MEASUREMENTS);
    }

    #[test]
    fn test_persisted_layout() {
        let mut log = MeasurementLog::new();
        log.push(entry(1)).unwrap();
        let bytes = log.to_bytes();
        assert_eq!(bytes.len(), LOG_HEADER_SIZE + MEASUREMENT_SIZE);
        assert_eq!(MeasurementLog::from_bytes(&bytes).unwrap(), log);
    }

    #[test]
    fn test_tampered_entry_detected() {
        let mut log = MeasurementLog::new();
        log.push(entry(1)).unwrap();
        let mut bytes = log.to_bytes();
        bytes[LOG_HEADER_SIZE + 20] ^= 0x80;
        assert_eq!(MeasurementLog::from_bytes(&bytes), Err(Error::IntegrityViolation));
    }
}
