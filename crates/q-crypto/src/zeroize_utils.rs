// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Secure memory utilities
//!
//! Key seeds live in [`SecureBuffer`], which zeroizes on drop. The
//! XOR-accumulate comparison is used wherever a digest is checked against a
//! stored value.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secure buffer that zeroizes on drop
///
/// This wrapper ensures sensitive data is zeroized when it goes out of scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBuffer<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> SecureBuffer<N> {
    /// Create a new zeroed secure buffer
    #[must_use]
    pub const fn new() -> Self {
        Self { data: [0u8; N] }
    }

    /// Create from a byte slice
    ///
    /// Returns `None` if the slice length doesn't match N.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != N {
            return None;
        }
        let mut buf = Self::new();
        buf.data.copy_from_slice(slice);
        Some(buf)
    }

    /// Take ownership of an array, zeroizing the caller's copy
    #[must_use]
    pub fn from_array(mut bytes: [u8; N]) -> Self {
        let buf = Self { data: bytes };
        bytes.zeroize();
        buf
    }

    /// Get the data as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get the data as a fixed array reference
    #[must_use]
    pub const fn as_array(&self) -> &[u8; N] {
        &self.data
    }

    /// Check whether every byte equals the first (all-zero included)
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match self.data.first() {
            Some(first) => self.data.iter().all(|b| b == first),
            None => true,
        }
    }
}

impl<const N: usize> Default for SecureBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for SecureBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SecureBuffer<{N}>([REDACTED])")
    }
}
