// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Execution contexts
//!
//! A context starts with ambient authority. Entering restricted mode fixes a
//! capability ceiling that can only shrink afterwards:
//!
//! ```text
//! Ambient --enter_restricted(R)--> Restricted(R) --narrow(N)--> Restricted(R & N)
//! ```
//!
//! There is no transition back to `Ambient` and no way to widen the ceiling.
//! A context is owned by one thread, so none of this needs a lock.

use std::collections::BTreeMap;

use q_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::rights::Rights;

/// Most resource handles a single context may limit
pub const MAX_LIMITED_HANDLES: usize = 64;

/// Authority mode of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Ambient authority, no ceiling
    Ambient,
    /// Restricted to a ceiling
    Restricted,
}

/// Read-only view of a context's mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInfo {
    /// Current mode
    pub mode: Mode,
    /// Ceiling; [`Rights::ALL`] while ambient
    pub ceiling: Rights,
}

impl ModeInfo {
    /// Whether the context is restricted
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.mode == Mode::Restricted
    }
}

/// A principal's execution context
#[derive(Debug)]
pub struct ExecutionContext {
    principal: u32,
    label: String,
    correlation: u64,
    ceiling: Option<Rights>,
    limits: BTreeMap<u32, Rights>,
}

impl ExecutionContext {
    /// Create an ambient context
    ///
    /// `correlation` tags every audit record produced on this context's
    /// behalf.
    #[must_use]
    pub fn new(principal: u32, label: impl Into<String>, correlation: u64) -> Self {
        Self {
            principal,
            label: label.into(),
            correlation,
            ceiling: None,
            limits: BTreeMap::new(),
        }
    }

    /// Principal id
    #[must_use]
    pub fn principal(&self) -> u32 {
        self.principal
    }

    /// Policy label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Correlation id for audit records
    #[must_use]
    pub fn correlation(&self) -> u64 {
        self.correlation
    }

    /// Current mode and ceiling
    #[must_use]
    pub fn query_mode(&self) -> ModeInfo {
        match self.ceiling {
            Some(ceiling) => ModeInfo {
                mode: Mode::Restricted,
                ceiling,
            },
            None => ModeInfo {
                mode: Mode::Ambient,
                ceiling: Rights::ALL,
            },
        }
    }

    /// Limit recorded for `handle`, if any
    #[must_use]
    pub fn limit(&self, handle: u32) -> Option<Rights> {
        self.limits.get(&handle).copied()
    }

    /// Rights usable on `handle`: its limit within the ceiling, or the
    /// ceiling itself
    #[must_use]
    pub fn effective(&self, handle: u32) -> Rights {
        let ceiling = self.query_mode().ceiling;
        self.limit(handle)
            .map_or(ceiling, |limit| limit.intersection(ceiling))
    }

    /// Intersect the ceiling with `rights`
    ///
    /// Existing handle limits are narrowed with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the context is not restricted.
    pub fn narrow(&mut self, rights: Rights) -> Result<Rights> {
        let ceiling = self.ceiling.ok_or(Error::InvalidParameter)?;
        let narrowed = ceiling.intersection(rights);
        self.ceiling = Some(narrowed);
        for limit in self.limits.values_mut() {
            *limit = limit.intersection(narrowed);
        }
        Ok(narrowed)
    }

    pub(crate) fn enter_restricted(&mut self, rights: Rights) -> Result<()> {
        if self.ceiling.is_some() {
            return Err(Error::InvalidParameter);
        }
        self.ceiling = Some(rights);
        Ok(())
    }

    pub(crate) fn limit_resource(&mut self, handle: u32, rights: Rights) -> Result<()> {
        let ceiling = self.ceiling.ok_or(Error::InvalidParameter)?;
        if !rights.is_subset_of(ceiling) {
            return Err(Error::Permission);
        }
        let held = self.limits.len();
        match self.limits.get_mut(&handle) {
            Some(existing) if !rights.is_subset_of(*existing) => Err(Error::Permission),
            Some(existing) => {
                *existing = rights;
                Ok(())
            }
            None if held >= MAX_LIMITED_HANDLES => Err(Error::ResourceExhausted),
            None => {
                self.limits.insert(handle, rights);
                Ok(())
            }
        }
    }
}
