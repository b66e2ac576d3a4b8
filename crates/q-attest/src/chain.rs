// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot chain submitted for verification

use q_common::{Error, Result};

use crate::log::MAX_MEASUREMENTS;
use crate::measurement::{Measurement, REGISTER_COUNT};

/// Supported chain format version
pub const CHAIN_VERSION: u16 = 0x0100;

/// One stage of a boot chain: the claimed measurement and the artifact it
/// claims to measure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// Signed measurement
    pub measurement: Measurement,
    /// Artifact bytes to re-measure
    pub artifact: Vec<u8>,
}

/// Ordered boot chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootChain {
    /// Format version
    pub version: u16,
    /// Links in boot order
    pub links: Vec<ChainLink>,
}

impl BootChain {
    /// Create a chain in the current format
    #[must_use]
    pub fn new(links: Vec<ChainLink>) -> Self {
        Self {
            version: CHAIN_VERSION,
            links,
        }
    }

    /// Number of links
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if the chain has no links
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Structural checks that need no cryptography
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] on a wrong version, a link count
    /// outside `1..=MAX_MEASUREMENTS`, an out-of-range register or sequence
    /// numbers that are not strictly increasing.
    pub fn validate(&self) -> Result<()> {
        if self.version != CHAIN_VERSION {
            return Err(Error::InvalidParameter);
        }
        if self.links.is_empty() || self.links.len() > MAX_MEASUREMENTS {
            return Err(Error::InvalidParameter);
        }
        if self.links.iter().any(|l| l.measurement.register >= REGISTER_COUNT) {
            return Err(Error::InvalidParameter);
        }
        let increasing = self
            .links
            .windows(2)
            .all(|w| w[0].measurement.sequence < w[1].measurement.sequence);
        if !increasing {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}
