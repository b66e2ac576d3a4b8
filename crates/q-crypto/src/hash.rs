// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hash function implementations
//!
//! SHA3-512 produces the 64-byte measurement digests and register values;
//! SHA3-256 hashes audit payloads before they are MAC'd.

use core::fmt;

use sha3::{Digest, Sha3_256 as Sha3_256Impl, Sha3_512 as Sha3_512Impl};
use subtle::{Choice, ConstantTimeEq};

use crate::traits::Hash;

/// Size of a measurement digest in bytes
pub const DIGEST_SIZE: usize = 64;

/// 64-byte SHA3-512 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest512([u8; DIGEST_SIZE]);

impl Digest512 {
    /// All-zero digest, the initial value of every register
    pub const ZERO: Self = Self([0u8; DIGEST_SIZE]);

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly 64 bytes
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; DIGEST_SIZE] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Borrow the raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Accumulate `digest` into `self`: `H(self || digest)`
    #[must_use]
    pub fn extend(&self, digest: &Self) -> Self {
        let mut hasher = Sha3_512::new();
        hasher.update(&self.0);
        hasher.update(&digest.0);
        hasher.finalize()
    }
}

impl ConstantTimeEq for Digest512 {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl AsRef<[u8]> for Digest512 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest512 {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Digest512 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest512(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// 32-byte SHA3-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Digest256([u8; 32]);

impl Digest256 {
    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Digest256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA3-256 hasher
pub struct Sha3_256 {
    inner: Sha3_256Impl,
}

impl Hash for Sha3_256 {
    const OUTPUT_SIZE: usize = 32;

    type Output = Digest256;

    fn hash(message: &[u8]) -> Self::Output {
        let mut output = [0u8; 32];
        output.copy_from_slice(&Sha3_256Impl::digest(message));
        Digest256(output)
    }

    fn new() -> Self {
        Self {
            inner: Sha3_256Impl::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn finalize(self) -> Self::Output {
        let mut output = [0u8; 32];
        output.copy_from_slice(&self.inner.finalize());
        Digest256(output)
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.inner);
    }
}

/// SHA3-512 hasher
pub struct Sha3_512 {
    inner: Sha3_512Impl,
}

impl Hash for Sha3_512 {
    const OUTPUT_SIZE: usize = DIGEST_SIZE;

    type Output = Digest512;

    fn hash(message: &[u8]) -> Self::Output {
        let mut output = [0u8; DIGEST_SIZE];
        output.copy_from_slice(&Sha3_512Impl::digest(message));
        Digest512(output)
    }

    fn new() -> Self {
        Self {
            inner: Sha3_512Impl::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn finalize(self) -> Self::Output {
        let mut output = [0u8; DIGEST_SIZE];
        output.copy_from_slice(&self.inner.finalize());
        Digest512(output)
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.inner);
    }
}

/// One-shot SHA3-512
#[must_use]
pub fn sha3_512(data: &[u8]) -> Digest512 {
    Sha3_512::hash(data)
}

/// One-shot SHA3-256
#[must_use]
pub fn sha3_256(data: &[u8]) -> Digest256 {
    Sha3_256::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha3_512_empty() {
        // NIST FIPS 202 test vector for the empty message
        let digest = sha3_512(b"");
        assert_eq!(&digest.as_bytes()[..4], &[0xa6, 0x9f, 0x73, 0xcc]);
    }

    #[test]
    fn test_sha3_256_abc() {
        let digest = sha3_256(b"abc");
        assert_eq!(&digest.as_bytes()[..4], &[0x3a, 0x98, 0x5d, 0xa7]);
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = Sha3_512::new();
        hasher.update(b"boot");
        hasher.update(b"loader");
        assert_eq!(hasher.finalize(), sha3_512(b"bootloader"));
    }

    #[test]
    fn test_extend_is_order_sensitive() {
        let a = sha3_512(b"a");
        let b = sha3_512(b"b");
        let ab = Digest512::ZERO.extend(&a).extend(&b);
        let ba = Digest512::ZERO.extend(&b).extend(&a);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_extend_definition() {
        let d = sha3_512(b"kernel");
        let mut concat = [0u8; 128];
        concat[64..].copy_from_slice(d.as_bytes());
        assert_eq!(Digest512::ZERO.extend(&d), sha3_512(&concat));
    }

    #[test]
    fn test_from_slice_length() {
        assert!(Digest512::from_slice(&[0u8; 63]).is_none());
        assert!(Digest512::from_slice(&[0u8; 64]).is_some());
    }
}
