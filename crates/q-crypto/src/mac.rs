// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Record authentication
//!
//! HMAC-SHA3-256 keyed MAC used to seal audit records.

use hmac::{Hmac, Mac};
use sha3::Sha3_256;

use crate::error::{CryptoError, CryptoResult};
use crate::zeroize_utils::SecureBuffer;

/// MAC tag size in bytes
pub const MAC_SIZE: usize = 32;

type HmacSha3_256 = Hmac<Sha3_256>;

/// Keyed record MAC
#[derive(Clone)]
pub struct RecordMac {
    keyed: HmacSha3_256,
}

impl RecordMac {
    /// Create from a 32-byte key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the MAC rejects the key.
    pub fn new(key: &SecureBuffer<32>) -> CryptoResult<Self> {
        let keyed = <HmacSha3_256 as Mac>::new_from_slice(key.as_slice())
            .map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { keyed })
    }

    fn keyed(&self) -> HmacSha3_256 {
        self.keyed.clone()
    }

    /// Compute the tag over `parts`, in order
    #[must_use]
    pub fn compute(&self, parts: &[&[u8]]) -> [u8; MAC_SIZE] {
        let mut mac = self.keyed();
        for part in parts {
            mac.update(part);
        }
        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        tag
    }

    /// Verify `tag` over `parts` in constant time
    #[must_use]
    pub fn verify(&self, parts: &[&[u8]], tag: &[u8]) -> bool {
        let mut mac = self.keyed();
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(tag).is_ok()
    }
}

impl core::fmt::Debug for RecordMac {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordMac").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> RecordMac {
        RecordMac::new(&SecureBuffer::from_array([0x42; 32])).unwrap()
    }

    #[test]
    fn test_compute_verify() {
        let m = mac();
        let tag = m.compute(&[b"seq", b"payload"]);
        assert!(m.verify(&[b"seq", b"payload"], &tag));
        assert!(!m.verify(&[b"seq", b"payloaD"], &tag));
    }

    #[test]
    fn test_parts_are_concatenated() {
        let m = mac();
        assert_eq!(m.compute(&[b"ab", b"c"]), m.compute(&[b"a", b"bc"]));
    }

    #[test]
    fn test_key_matters() {
        let other = RecordMac::new(&SecureBuffer::from_array([0x43; 32])).unwrap();
        assert_ne!(mac().compute(&[b"x"]), other.compute(&[b"x"]));
    }

    #[test]
    fn test_truncated_tag_rejected() {
        let m = mac();
        let tag = m.compute(&[b"x"]);
        assert!(!m.verify(&[b"x"], &tag[..16]));
    }
}
