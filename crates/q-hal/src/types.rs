// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Data types exchanged with hardware collaborators

use core::fmt;

// =============================================================================
// Address Ranges and Permissions
// =============================================================================

/// Half-open address range `[base, base + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    /// Start address
    pub base: u64,
    /// Length in bytes
    pub size: u64,
}

impl AddressRange {
    /// Create a range, returning `None` for zero size or address-space overflow
    #[must_use]
    pub const fn new(base: u64, size: u64) -> Option<Self> {
        if size == 0 || base.checked_add(size).is_none() {
            return None;
        }
        Some(Self { base, size })
    }

    /// Exclusive end address
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    /// Inclusive last address
    #[must_use]
    pub const fn last(&self) -> u64 {
        self.end().saturating_sub(1)
    }

    /// Whether `other` lies entirely within `self`
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.base >= self.base && other.end() <= self.end()
    }

    /// Whether the two ranges share at least one address
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.base, self.end())
    }
}

/// Page-level access permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PagePermissions {
    /// Read access allowed
    pub read: bool,
    /// Write access allowed
    pub write: bool,
    /// Execute access allowed
    pub execute: bool,
}

impl PagePermissions {
    /// No access
    pub const NONE: Self = Self {
        read: false,
        write: false,
        execute: false,
    };
    /// Read-only
    pub const RO: Self = Self {
        read: true,
        write: false,
        execute: false,
    };
    /// Read-write
    pub const RW: Self = Self {
        read: true,
        write: true,
        execute: false,
    };
    /// Read-execute
    pub const RX: Self = Self {
        read: true,
        write: false,
        execute: true,
    };
    /// Unrestricted, the default for unmanaged memory
    pub const ALL: Self = Self {
        read: true,
        write: true,
        execute: true,
    };
}

/// Cache policy for a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    /// Platform default
    #[default]
    Default,
    /// Write-back
    WriteBack,
    /// Write-through
    WriteThrough,
}

// =============================================================================
// Root of Trust
// =============================================================================

/// Hash algorithm capability bit: SHA3-512 (64-byte digests)
pub const HASH_SHA3_512: u32 = 1 << 0;
/// Hash algorithm capability bit: SHA-256 (32-byte digests)
pub const HASH_SHA256: u32 = 1 << 1;

/// Root-of-trust probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotCapabilities {
    /// Device interface version
    pub version: u16,
    /// Supported hash algorithms (`HASH_*` bits)
    pub hash_algorithms: u32,
    /// Supported signature algorithms (`SignatureAlgorithm::capability_bit`)
    pub signature_algorithms: u32,
    /// Number of accumulator registers
    pub register_count: u32,
}

// =============================================================================
// Optional Protection Features
// =============================================================================

/// Optional hardware protection features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtectionFeature {
    /// No-execute pages
    Nx = 0,
    /// Supervisor-mode execution prevention
    Smep = 1,
    /// Supervisor-mode access prevention
    Smap = 2,
    /// Protection keys
    Pku = 3,
    /// Control-flow enforcement
    Cet = 4,
}

impl ProtectionFeature {
    /// All features, in probe order
    pub const ALL: [Self; 5] = [Self::Nx, Self::Smep, Self::Smap, Self::Pku, Self::Cet];

    /// Short name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nx => "nx",
            Self::Smep => "smep",
            Self::Smap => "smap",
            Self::Pku => "pku",
            Self::Cet => "cet",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of protection features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtectionFeatures(u8);

impl ProtectionFeatures {
    /// Empty set
    pub const EMPTY: Self = Self(0);

    /// Set from raw bits (unknown bits discarded)
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x1F)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Membership test
    #[must_use]
    pub const fn contains(&self, feature: ProtectionFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    /// Add a feature
    #[must_use]
    pub const fn with(self, feature: ProtectionFeature) -> Self {
        Self(self.0 | feature.bit())
    }

    /// Remove a feature
    #[must_use]
    pub const fn without(self, feature: ProtectionFeature) -> Self {
        Self(self.0 & !feature.bit())
    }

    /// Whether the set is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over members
    pub fn iter(self) -> impl Iterator<Item = ProtectionFeature> {
        ProtectionFeature::ALL
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl FromIterator<ProtectionFeature> for ProtectionFeatures {
    fn from_iter<I: IntoIterator<Item = ProtectionFeature>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// x86-64
    X86_64,
    /// AArch64 (ARMv8-A and later)
    Aarch64,
    /// Host simulation
    Simulated,
}
