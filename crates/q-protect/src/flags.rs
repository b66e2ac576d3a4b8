// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Region protection flags
//!
//! | Bit  | Flag              | Meaning                               |
//! |------|-------------------|---------------------------------------|
//! | 0x01 | `READ`            | Loads allowed                         |
//! | 0x02 | `WRITE`           | Stores allowed                        |
//! | 0x04 | `EXEC`            | Instruction fetch allowed             |
//! | 0x08 | `DMA`             | Device access allowed (needs a mask)  |
//! | 0x10 | `CACHE_WB`        | Write-back caching                    |
//! | 0x20 | `CACHE_WT`        | Write-through caching                 |
//! | 0x40 | `SECURE`          | Secure-world only                     |
//! | 0x80 | `NO_SIDE_CHANNEL` | Side-channel hardened mapping         |

use core::fmt;
use core::ops::{BitAnd, BitOr};

use q_common::{Error, Result};
use q_hal::{CachePolicy, PagePermissions};
use serde::{Deserialize, Serialize};

/// Protection flags of a region, or the access requested against one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionFlags(u32);

impl RegionFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Read access
    pub const READ: Self = Self(0x01);
    /// Write access
    pub const WRITE: Self = Self(0x02);
    /// Execute access
    pub const EXEC: Self = Self(0x04);
    /// Device (DMA) access
    pub const DMA: Self = Self(0x08);
    /// Write-back cache policy
    pub const CACHE_WB: Self = Self(0x10);
    /// Write-through cache policy
    pub const CACHE_WT: Self = Self(0x20);
    /// Secure-world only
    pub const SECURE: Self = Self(0x40);
    /// Side-channel hardened
    pub const NO_SIDE_CHANNEL: Self = Self(0x80);

    const KNOWN: u32 = 0xFF;

    /// Parse raw bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] on unknown bits or when both cache
    /// policies are requested.
    pub const fn from_bits(bits: u32) -> Result<Self> {
        let flags = Self(bits);
        if bits & !Self::KNOWN != 0 {
            return Err(Error::InvalidParameter);
        }
        if flags.contains(Self::CACHE_WB) && flags.contains(Self::CACHE_WT) {
            return Err(Error::InvalidParameter);
        }
        Ok(flags)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union of two flag sets
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Page permissions the MMU should apply
    #[must_use]
    pub const fn permissions(&self) -> PagePermissions {
        PagePermissions {
            read: self.contains(Self::READ),
            write: self.contains(Self::WRITE),
            execute: self.contains(Self::EXEC),
        }
    }

    /// Cache policy the MMU should apply
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        if self.contains(Self::CACHE_WB) {
            CachePolicy::WriteBack
        } else if self.contains(Self::CACHE_WT) {
            CachePolicy::WriteThrough
        } else {
            CachePolicy::Default
        }
    }
}

impl BitOr for RegionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for RegionFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for RegionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag: Self, c: char| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            bit(Self::READ, 'r'),
            bit(Self::WRITE, 'w'),
            bit(Self::EXEC, 'x'),
            bit(Self::DMA, 'd')
        )?;
        match self.cache_policy() {
            CachePolicy::WriteBack => f.write_str(" wb")?,
            CachePolicy::WriteThrough => f.write_str(" wt")?,
            CachePolicy::Default => {}
        }
        if self.contains(Self::SECURE) {
            f.write_str(" secure")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits_validation() {
        assert_eq!(RegionFlags::from_bits(0x03), Ok(RegionFlags::READ | RegionFlags::WRITE));
        assert_eq!(RegionFlags::from_bits(0x100), Err(Error::InvalidParameter));
        assert_eq!(RegionFlags::from_bits(0x30), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_subset() {
        let rw = RegionFlags::READ | RegionFlags::WRITE;
        assert!(rw.contains(RegionFlags::READ));
        assert!(rw.contains(RegionFlags::NONE));
        assert!(!rw.contains(RegionFlags::EXEC));
        assert!(!rw.contains(rw | RegionFlags::DMA));
    }

    #[test]
    fn test_hardware_mapping() {
        let flags = RegionFlags::READ | RegionFlags::EXEC | RegionFlags::CACHE_WT;
        assert_eq!(flags.permissions(), PagePermissions::RX);
        assert_eq!(flags.cache_policy(), CachePolicy::WriteThrough);
        assert_eq!(RegionFlags::NONE.cache_policy(), CachePolicy::Default);
    }

    #[test]
    fn test_display() {
        let flags = RegionFlags::READ | RegionFlags::WRITE | RegionFlags::CACHE_WB;
        assert_eq!(flags.to_string(), "rw-- wb");
    }
}
