// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Capability rights
//!
//! In policy files a rights set is written either as raw bits or as a list
//! of names:
//!
//! ```toml
//! allow = ["read", "seek"]
//! deny = 0x04
//! ```

use core::fmt;
use core::str::FromStr;

use q_common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Set of rights over a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rights(u32);

const NAMES: [(Rights, &str); 6] = [
    (Rights::READ, "read"),
    (Rights::WRITE, "write"),
    (Rights::EXEC, "exec"),
    (Rights::MMAP, "mmap"),
    (Rights::IOCTL, "ioctl"),
    (Rights::SEEK, "seek"),
];

impl Rights {
    /// No rights
    pub const NONE: Self = Self(0);
    /// Read
    pub const READ: Self = Self(0x01);
    /// Write
    pub const WRITE: Self = Self(0x02);
    /// Execute
    pub const EXEC: Self = Self(0x04);
    /// Map into memory
    pub const MMAP: Self = Self(0x08);
    /// Device control
    pub const IOCTL: Self = Self(0x10);
    /// Reposition
    pub const SEEK: Self = Self(0x20);
    /// Every right
    pub const ALL: Self = Self(0x3F);

    /// Parse raw bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if any unknown bit is set.
    pub const fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::ALL.0 != 0 {
            Err(Error::InvalidParameter)
        } else {
            Ok(Self(bits))
        }
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether `self` is a subset of `other`
    #[must_use]
    pub const fn is_subset_of(&self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Whether the two sets share a right
    #[must_use]
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Rights present in both
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Rights present in either
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether the set is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Names of the rights in the set
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .into_iter()
            .filter(move |(right, _)| right.is_subset_of(self))
            .map(|(_, name)| name)
    }
}

impl core::ops::BitOr for Rights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl FromStr for Rights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(right, _)| *right)
            .ok_or(Error::InvalidParameter)
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.names().collect();
        f.write_str(&names.join("|"))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RightsRepr {
    Bits(u32),
    Names(Vec<String>),
}

impl<'de> Deserialize<'de> for Rights {
    fn deserialize<D: Deserializer<'de>>(d: D) -> core::result::Result<Self, D::Error> {
        let parsed = match RightsRepr::deserialize(d)? {
            RightsRepr::Bits(bits) => Self::from_bits(bits),
            RightsRepr::Names(names) => names
                .iter()
                .try_fold(Self::NONE, |acc, name| name.parse().map(|r: Self| acc | r)),
        };
        parsed.map_err(|_| serde::de::Error::custom("unknown capability right"))
    }
}

impl Serialize for Rights {
    fn serialize<S: Serializer>(&self, s: S) -> core::result::Result<S::Ok, S::Error> {
        s.collect_seq(self.names())
    }
}
