// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Attestation evidence
//!
//! # Protocol
//!
//! 1. Verifier sends a fresh nonce
//! 2. Anchor reads every register and the log integrity hash under the log lock
//! 3. Anchor signs the report through its signing provider
//! 4. Verifier checks nonce, signature and expected register values

use q_common::{Error, Result, Timestamp};
use q_crypto::{constant_time_eq, Digest512, SignatureBytes, SigningProvider, DIGEST_SIZE};

use crate::measurement::REGISTER_COUNT;

/// Nonce size in bytes
pub const NONCE_SIZE: usize = 32;

/// Report format version
pub const REPORT_VERSION: u8 = 1;

const REGISTERS: usize = REGISTER_COUNT as usize;

/// Signed snapshot of the anchor's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationReport {
    /// Format version
    pub version: u8,
    /// Verifier challenge
    pub nonce: [u8; NONCE_SIZE],
    /// Time the report was produced
    pub timestamp: Timestamp,
    /// Register values in index order
    pub registers: [Digest512; REGISTERS],
    /// Measurement log integrity hash
    pub log_integrity: Digest512,
    /// Number of log entries covered
    pub log_len: u32,
    /// Signature over [`to_signed_bytes`](Self::to_signed_bytes)
    pub signature: SignatureBytes,
}

impl AttestationReport {
    /// Bytes covered by the signature
    #[must_use]
    pub fn to_signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + NONCE_SIZE + 8 + (REGISTERS + 1) * DIGEST_SIZE + 4);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.timestamp.as_millis().to_le_bytes());
        for register in &self.registers {
            bytes.extend_from_slice(register.as_bytes());
        }
        bytes.extend_from_slice(self.log_integrity.as_bytes());
        bytes.extend_from_slice(&self.log_len.to_le_bytes());
        bytes
    }

    /// Check the signature and the nonce
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] if the nonce differs or the
    /// signature does not verify.
    pub fn verify(&self, verifier: &dyn SigningProvider, nonce: &[u8; NONCE_SIZE]) -> Result<()> {
        let nonce_ok = constant_time_eq(&self.nonce, nonce);
        let signature_ok = verifier
            .verify(&self.to_signed_bytes(), &self.signature)
            .unwrap_or(false);
        if nonce_ok && signature_ok {
            Ok(())
        } else {
            Err(Error::IntegrityViolation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_crypto::{Ed25519Provider, SecureBuffer};

    fn signed(provider: &Ed25519Provider) -> AttestationReport {
        let mut report = AttestationReport {
            version: REPORT_VERSION,
            nonce: [0xCD; NONCE_SIZE],
            timestamp: Timestamp::from_millis(1_704_067_200),
            registers: [Digest512::ZERO; REGISTERS],
            log_integrity: Digest512::ZERO,
            log_len: 0,
            signature: [0; 64],
        };
        report.signature = provider.sign(&report.to_signed_bytes()).unwrap();
        report
    }

    #[test]
    fn test_report_verifies() {
        let provider = Ed25519Provider::from_seed(&SecureBuffer::from_array([3; 32]));
        let report = signed(&provider);
        report.verify(&provider, &[0xCD; NONCE_SIZE]).unwrap();
    }

    #[test]
    fn test_wrong_nonce() {
        let provider = Ed25519Provider::from_seed(&SecureBuffer::from_array([3; 32]));
        let report = signed(&provider);
        assert_eq!(
            report.verify(&provider, &[0; NONCE_SIZE]),
            Err(Error::IntegrityViolation)
        );
    }

    #[test]
    fn test_altered_register() {
        let provider = Ed25519Provider::from_seed(&SecureBuffer::from_array([3; 32]));
        let mut report = signed(&provider);
        report.registers[1] = Digest512::from_bytes([1; DIGEST_SIZE]);
        assert_eq!(
            report.verify(&provider, &[0xCD; NONCE_SIZE]),
            Err(Error::IntegrityViolation)
        );
    }

    #[test]
    fn test_signed_bytes_are_deterministic() {
        let provider = Ed25519Provider::from_seed(&SecureBuffer::from_array([3; 32]));
        assert_eq!(signed(&provider).to_signed_bytes(), signed(&provider).to_signed_bytes());
    }
}
