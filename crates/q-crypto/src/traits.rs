// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Cryptographic trait definitions
//!
//! The trust anchor never touches key material directly. Signing and
//! verification are delegated to a [`SigningProvider`], which may be backed by
//! an HSM, a TPM or an in-memory key.

use crate::error::CryptoResult;

/// Size of a signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Fixed-size signature bytes
pub type SignatureBytes = [u8; SIGNATURE_SIZE];

/// Signature algorithms a provider may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    /// Ed25519 (deterministic, no secret-dependent branching)
    Ed25519 = 0x01,
}

impl SignatureAlgorithm {
    /// Capability bit advertised by a root of trust supporting this algorithm
    #[must_use]
    pub const fn capability_bit(&self) -> u32 {
        1 << (*self as u8)
    }
}

/// External signing and verification provider
///
/// `verify` must use the primitive's own constant-time check and never
/// compare raw signature bytes.
pub trait SigningProvider: Send + Sync {
    /// Algorithm implemented by this provider
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Sign `data`
    ///
    /// # Errors
    ///
    /// Returns [`crate::CryptoError::SigningFailed`] if the provider cannot sign.
    fn sign(&self, data: &[u8]) -> CryptoResult<SignatureBytes>;

    /// Verify `signature` over `data`
    ///
    /// # Errors
    ///
    /// Returns [`crate::CryptoError::MalformedSignature`] if `signature` has
    /// the wrong length or encoding. A well-formed but wrong signature is
    /// `Ok(false)`.
    fn verify(&self, data: &[u8], signature: &[u8]) -> CryptoResult<bool>;
}

/// Hash function trait
pub trait Hash: Sized {
    /// Output size in bytes
    const OUTPUT_SIZE: usize;

    /// Hash output type
    type Output: AsRef<[u8]> + Clone;

    /// One-shot hash
    fn hash(message: &[u8]) -> Self::Output;

    /// Create a new incremental hasher
    fn new() -> Self;

    /// Absorb data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the digest
    fn finalize(self) -> Self::Output;

    /// Reset to the initial state
    fn reset(&mut self);
}

/// Constant-time comparison
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Slices of different lengths compare unequal without inspecting contents.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_capability_bit() {
        assert_eq!(SignatureAlgorithm::Ed25519.capability_bit(), 0b10);
    }
}
