// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Measurements and logical registers
//!
//! ## Encoding (152 bytes, little-endian)
//!
//! | Offset | Size | Field         |
//! |--------|------|---------------|
//! | 0      | 4    | Register      |
//! | 4      | 4    | Reserved      |
//! | 8      | 64   | Digest        |
//! | 72     | 64   | Signature     |
//! | 136    | 8    | Timestamp     |
//! | 144    | 8    | Sequence      |
//!
//! The signature covers the canonical form `register | digest | timestamp |
//! sequence`, which is the encoding above without the reserved word and the
//! signature itself.

use q_common::{Error, Result, Timestamp};
use q_crypto::{Digest512, SignatureBytes, DIGEST_SIZE, SIGNATURE_SIZE};
use serde::{Deserialize, Serialize};

/// Number of logical registers
pub const REGISTER_COUNT: u32 = 5;

/// Encoded measurement size
pub const MEASUREMENT_SIZE: usize = 152;

/// Canonical signed form size
pub const SIGNED_SIZE: usize = 4 + DIGEST_SIZE + 8 + 8;

/// Logical register assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Register {
    /// Boot chain stages
    BootChain = 0,
    /// Kernel image
    Kernel = 1,
    /// Loadable modules
    Modules = 2,
    /// Configuration
    Config = 3,
    /// Runtime events
    Runtime = 4,
}

impl Register {
    /// All registers in index order
    pub const ALL: [Self; REGISTER_COUNT as usize] = [
        Self::BootChain,
        Self::Kernel,
        Self::Modules,
        Self::Config,
        Self::Runtime,
    ];

    /// Register index
    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Register {
    type Error = Error;

    fn try_from(index: u32) -> Result<Self> {
        match index {
            0 => Ok(Self::BootChain),
            1 => Ok(Self::Kernel),
            2 => Ok(Self::Modules),
            3 => Ok(Self::Config),
            4 => Ok(Self::Runtime),
            _ => Err(Error::InvalidParameter),
        }
    }
}

/// One signed entry of the measurement log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Register the digest was accumulated into
    pub register: u32,
    /// SHA3-512 of the measured artifact
    pub digest: Digest512,
    /// Provider signature over the canonical form
    pub signature: SignatureBytes,
    /// Time of measurement
    pub timestamp: Timestamp,
    /// Anchor-assigned sequence number
    pub sequence: u64,
}

impl Measurement {
    /// Canonical bytes covered by the signature
    #[must_use]
    pub fn signed_bytes(
        register: u32,
        digest: &Digest512,
        timestamp: Timestamp,
        sequence: u64,
    ) -> [u8; SIGNED_SIZE] {
        let mut out = [0u8; SIGNED_SIZE];
        out[0..4].copy_from_slice(&register.to_le_bytes());
        out[4..68].copy_from_slice(digest.as_bytes());
        out[68..76].copy_from_slice(&timestamp.as_millis().to_le_bytes());
        out[76..84].copy_from_slice(&sequence.to_le_bytes());
        out
    }

    /// Canonical bytes of this measurement
    #[must_use]
    pub fn to_signed_bytes(&self) -> [u8; SIGNED_SIZE] {
        Self::signed_bytes(self.register, &self.digest, self.timestamp, self.sequence)
    }

    /// Fixed-size encoding
    #[must_use]
    pub fn encode(&self) -> [u8; MEASUREMENT_SIZE] {
        let mut out = [0u8; MEASUREMENT_SIZE];
        out[0..4].copy_from_slice(&self.register.to_le_bytes());
        out[8..72].copy_from_slice(self.digest.as_bytes());
        out[72..136].copy_from_slice(&self.signature);
        out[136..144].copy_from_slice(&self.timestamp.as_millis().to_le_bytes());
        out[144..152].copy_from_slice(&self.sequence.to_le_bytes());
        out
    }

    /// Decode a fixed-size encoding
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] on a short slice, a nonzero
    /// reserved word or an out-of-range register.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MEASUREMENT_SIZE || bytes[4..8] != [0; 4] {
            return Err(Error::InvalidParameter);
        }
        let word = |range: core::ops::Range<usize>| -> Result<u64> {
            let raw: [u8; 8] = bytes[range].try_into().map_err(|_| Error::InvalidParameter)?;
            Ok(u64::from_le_bytes(raw))
        };
        let register = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Register::try_from(register)?;
        let digest = Digest512::from_slice(&bytes[8..72]).ok_or(Error::InvalidParameter)?;
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[72..136]);

        Ok(Self {
            register,
            digest,
            signature,
            timestamp: Timestamp::from_millis(word(136..144)?),
            sequence: word(144..152)?,
        })
    }
}
