// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Region descriptors and handles

use core::fmt;

use q_common::config::RegionConfig;
use q_common::{Error, Result, Timestamp};
use q_hal::AddressRange;
use serde::{Deserialize, Serialize};

use crate::flags::RegionFlags;

/// Index of a slot in the protection table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionHandle(u16);

impl RegionHandle {
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Slot index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Raw handle value
    #[must_use]
    pub const fn raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Region requested by a caller of [`protect`](crate::ProtectionTable::protect)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    /// Base address, never zero
    pub base: u64,
    /// Size in bytes, never zero
    pub size: u64,
    /// Device-visible address mask, required for DMA regions
    pub device_mask: Option<u64>,
    /// Owning principal
    pub owner: u32,
}

impl RegionSpec {
    /// Region with no device mask and owner 0
    #[must_use]
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            device_mask: None,
            owner: 0,
        }
    }

    /// Set the device-address mask
    #[must_use]
    pub const fn with_device_mask(mut self, mask: u64) -> Self {
        self.device_mask = Some(mask);
        self
    }

    /// Set the owning principal
    #[must_use]
    pub const fn with_owner(mut self, owner: u32) -> Self {
        self.owner = owner;
        self
    }

    /// Build from a boot-time region entry, validating its flags
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the raw flags are invalid.
    pub fn from_config(config: &RegionConfig) -> Result<(Self, RegionFlags)> {
        let flags = RegionFlags::from_bits(config.flags)?;
        let spec = Self {
            base: config.base,
            size: config.size,
            device_mask: config.device_mask,
            owner: 0,
        };
        Ok((spec, flags))
    }

    /// Address range covered, after checking it against `flags`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a null base, zero size,
    /// address-space overflow, DMA without a device mask or a device mask
    /// without DMA.
    pub fn validate(&self, flags: RegionFlags) -> Result<AddressRange> {
        if self.base == 0 {
            return Err(Error::InvalidParameter);
        }
        let range = AddressRange::new(self.base, self.size).ok_or(Error::InvalidParameter)?;
        if flags.contains(RegionFlags::DMA) != self.device_mask.is_some() {
            return Err(Error::InvalidParameter);
        }
        Ok(range)
    }
}

/// Snapshot of a protected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Table slot
    pub handle: RegionHandle,
    /// Base address
    pub base: u64,
    /// Size in bytes
    pub size: u64,
    /// Current flags
    pub flags: RegionFlags,
    /// Device-address mask
    pub device_mask: Option<u64>,
    /// Owning principal
    pub owner: u32,
    /// Access checks against this region
    pub access_count: u64,
    /// Denied access checks
    pub violation_count: u64,
    /// Time of the most recent check
    pub last_access: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let rw = RegionFlags::READ | RegionFlags::WRITE;
        assert_eq!(RegionSpec::new(0, 4096).validate(rw), Err(Error::InvalidParameter));
        assert_eq!(RegionSpec::new(0x1000, 0).validate(rw), Err(Error::InvalidParameter));
        assert_eq!(
            RegionSpec::new(u64::MAX - 10, 4096).validate(rw),
            Err(Error::InvalidParameter)
        );
        let range = RegionSpec::new(0x1000, 4096).validate(rw).unwrap();
        assert_eq!(range.end(), 0x2000);
    }

    #[test]
    fn test_validate_pairs_dma_with_mask() {
        let dma = RegionFlags::READ | RegionFlags::DMA;
        assert_eq!(RegionSpec::new(0x1000, 64).validate(dma), Err(Error::InvalidParameter));
        assert!(RegionSpec::new(0x1000, 64)
            .with_device_mask(0xFFFF)
            .validate(dma)
            .is_ok());
        assert_eq!(
            RegionSpec::new(0x1000, 64)
                .with_device_mask(0xFFFF)
                .validate(RegionFlags::READ),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_from_config() {
        let config = RegionConfig {
            base: 0x8000,
            size: 0x100,
            flags: 0x05,
            device_mask: None,
        };
        let (spec, flags) = RegionSpec::from_config(&config).unwrap();
        assert_eq!(spec.base, 0x8000);
        assert_eq!(flags, RegionFlags::READ | RegionFlags::EXEC);

        let bad = RegionConfig {
            flags: 0x30,
            ..config
        };
        assert!(RegionSpec::from_config(&bad).is_err());
    }
}
