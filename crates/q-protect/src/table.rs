// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Protection table
//!
//! Regions live in a fixed-capacity slot arena; a [`RegionHandle`] is the
//! slot index. No two active regions overlap, so at most one region can
//! contain any queried range.
//!
//! Every mutation applies its MMU changes while holding the table lock, so
//! [`ProtectionTable::verify_access`] never observes a region whose hardware
//! state is only partly applied. Enforcement order:
//!
//! 1. `set_permissions`
//! 2. `invalidate_translation`
//! 3. `barrier` then `set_cache_policy`, only when the cache policy changes

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use q_audit::{audit_error, AuditClass, AuditEvent, AuditLedger, EventCode, Severity};
use q_common::config::{ProtectConfig, MAX_REGIONS};
use q_common::{Clock, CoreConfig, Error, Result, Timestamp};
use q_hal::{
    AddressRange, CachePolicy, HardwareCapabilities, MmuControl, ProtectionFeatures,
};
use serde::{Deserialize, Serialize};

use crate::flags::RegionFlags;
use crate::region::{RegionHandle, RegionInfo, RegionSpec};

/// Flags applied to memory no region covers
pub const UNMANAGED_FLAGS: RegionFlags = RegionFlags::READ
    .union(RegionFlags::WRITE)
    .union(RegionFlags::EXEC);

/// Table counters, readable without the table lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtectionStats {
    /// Regions currently protected
    pub active_regions: usize,
    /// Slot capacity
    pub capacity: usize,
    /// Access checks performed
    pub total_checks: u64,
    /// Access checks denied
    pub total_violations: u64,
    /// Hardware features currently enabled, as `ProtectionFeatures` bits
    pub enabled_features: u8,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ProtectedRegion {
    pub(crate) range: AddressRange,
    pub(crate) flags: RegionFlags,
    pub(crate) device_mask: Option<u64>,
    pub(crate) owner: u32,
    pub(crate) access_count: u64,
    pub(crate) violation_count: u64,
    pub(crate) last_access: Option<Timestamp>,
}

impl ProtectedRegion {
    fn info(&self, handle: RegionHandle) -> RegionInfo {
        RegionInfo {
            handle,
            base: self.range.base,
            size: self.range.size,
            flags: self.flags,
            device_mask: self.device_mask,
            owner: self.owner,
            access_count: self.access_count,
            violation_count: self.violation_count,
            last_access: self.last_access,
        }
    }
}

pub(crate) type Slots = Vec<Option<ProtectedRegion>>;

/// Memory and DMA protection table
pub struct ProtectionTable {
    capacity: usize,
    enable_hw_features: bool,
    lock_timeout: Duration,
    mmu: Arc<dyn MmuControl>,
    caps: Arc<dyn HardwareCapabilities>,
    pub(crate) ledger: Arc<AuditLedger>,
    pub(crate) clock: Arc<dyn Clock>,
    initialized: AtomicBool,
    slots: Mutex<Slots>,
    active: AtomicUsize,
    pub(crate) checks: AtomicU64,
    pub(crate) violations: AtomicU64,
}

impl ProtectionTable {
    /// Create an empty table
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `max_regions` is zero or
    /// above [`MAX_REGIONS`].
    pub fn new(
        config: &ProtectConfig,
        mmu: Arc<dyn MmuControl>,
        caps: Arc<dyn HardwareCapabilities>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.max_regions == 0 || config.max_regions > MAX_REGIONS {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            capacity: config.max_regions,
            enable_hw_features: config.enable_hw_features,
            lock_timeout: CoreConfig::DEFAULT.lock_timeout(),
            mmu,
            caps,
            ledger,
            clock,
            initialized: AtomicBool::new(false),
            slots: Mutex::new(vec![None; config.max_regions]),
            active: AtomicUsize::new(0),
            checks: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        })
    }

    /// Bound every internal lock acquisition by `timeout`
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub(crate) fn lock_slots(&self) -> Result<MutexGuard<'_, Slots>> {
        self.slots.try_lock_for(self.lock_timeout).ok_or(Error::Busy)
    }

    fn require_init(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unavailable)
        }
    }

    /// Enable the optional hardware features this platform has
    ///
    /// A feature that fails to enable is left off and logged; it is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the table lock times out.
    #[tracing::instrument(skip(self))]
    pub fn init(&self) -> Result<ProtectionFeatures> {
        let _guard = self.lock_slots()?;
        if self.enable_hw_features {
            for feature in self.caps.probe().iter() {
                if let Err(e) = self.caps.enable(feature) {
                    tracing::warn!(feature = feature.name(), error = %e, "feature not enabled");
                }
            }
        }
        let enabled = self.caps.enabled();
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(
            platform = ?self.caps.platform(),
            features = enabled.bits(),
            capacity = self.capacity,
            "protection table ready"
        );
        Ok(enabled)
    }

    /// Apply `flags` to `range` in hardware
    fn enforce(&self, range: AddressRange, flags: RegionFlags, previous: CachePolicy) -> Result<()> {
        self.mmu.set_permissions(range, flags.permissions())?;
        self.mmu.invalidate_translation(range)?;
        let policy = flags.cache_policy();
        if policy != previous {
            self.mmu.barrier();
            self.mmu.set_cache_policy(range, policy)?;
        }
        Ok(())
    }

    /// Put `range` back to unrestricted defaults, logging failures
    fn restore_defaults(&self, range: AddressRange, previous: CachePolicy) -> Result<()> {
        let outcome = self.enforce(range, UNMANAGED_FLAGS, previous);
        if let Err(e) = outcome {
            tracing::error!(%range, error = %e, "failed to restore default permissions");
        }
        outcome
    }

    fn record(&self, code: EventCode, handle: RegionHandle, range: AddressRange, flags: RegionFlags) {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&range.base.to_le_bytes());
        payload.extend_from_slice(&range.size.to_le_bytes());
        payload.extend_from_slice(&flags.bits().to_le_bytes());
        let event = AuditEvent::new(AuditClass::System, Severity::Info, code)
            .with_correlation(u64::from(handle.raw()))
            .with_payload(payload);
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(?code, error = %e, "failed to record region change");
        }
    }

    /// Protect a new region
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] on invalid geometry or flags, or overlap
    ///   with an existing region
    /// - [`Error::ResourceExhausted`] if every slot is taken
    /// - [`Error::Busy`] / [`Error::Unavailable`] if the MMU fails; nothing
    ///   is committed
    #[tracing::instrument(skip(self, spec, flags), fields(base = spec.base, size = spec.size, flags = flags.bits()))]
    pub fn protect(&self, spec: RegionSpec, flags: RegionFlags) -> Result<RegionHandle> {
        let range = spec.validate(flags)?;
        let handle = {
            let mut slots = self.lock_slots()?;
            self.require_init()?;
            if slots.iter().flatten().any(|r| r.range.overlaps(&range)) {
                tracing::warn!(%range, "region overlaps an existing region");
                return Err(Error::InvalidParameter);
            }
            let index = slots
                .iter()
                .position(Option::is_none)
                .ok_or(Error::ResourceExhausted)?;
            let handle = RegionHandle::new(u16::try_from(index).map_err(|_| Error::ResourceExhausted)?);

            if let Err(e) = self.enforce(range, flags, CachePolicy::Default) {
                if let Err(rollback) = self.restore_defaults(range, flags.cache_policy()) {
                    tracing::error!(%range, error = %rollback, "rollback of region protect failed");
                }
                return Err(e);
            }
            slots[index] = Some(ProtectedRegion {
                range,
                flags,
                device_mask: spec.device_mask,
                owner: spec.owner,
                access_count: 0,
                violation_count: 0,
                last_access: None,
            });
            self.active.fetch_add(1, Ordering::SeqCst);
            handle
        };
        tracing::debug!(%handle, %range, %flags, "region protected");
        self.record(EventCode::RegionProtected, handle, range, flags);
        Ok(handle)
    }

    /// Change the flags of an existing region, keeping its handle
    ///
    /// # Errors
    ///
    /// Same as [`protect`](Self::protect), plus [`Error::InvalidParameter`]
    /// for an unknown handle. On MMU failure the previous flags are
    /// reapplied.
    #[tracing::instrument(skip(self, flags), fields(flags = flags.bits()))]
    pub fn update_protection(&self, handle: RegionHandle, flags: RegionFlags) -> Result<()> {
        let range = {
            let mut slots = self.lock_slots()?;
            self.require_init()?;
            let region = slots
                .get_mut(handle.index())
                .and_then(Option::as_mut)
                .ok_or(Error::InvalidParameter)?;
            let spec = RegionSpec {
                base: region.range.base,
                size: region.range.size,
                device_mask: region.device_mask,
                owner: region.owner,
            };
            spec.validate(flags)?;

            let previous = region.flags;
            if let Err(e) = self.enforce(region.range, flags, previous.cache_policy()) {
                if let Err(rollback) =
                    self.enforce(region.range, previous, flags.cache_policy())
                {
                    tracing::error!(%handle, error = %rollback, "rollback of region update failed");
                }
                return Err(e);
            }
            region.flags = flags;
            region.range
        };
        self.record(EventCode::RegionUpdated, handle, range, flags);
        Ok(())
    }

    /// Remove a region and restore default permissions over it
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an unknown handle
    /// - [`Error::Busy`] / [`Error::Unavailable`] if the MMU fails; the
    ///   region stays protected
    #[tracing::instrument(skip(self))]
    pub fn release(&self, handle: RegionHandle) -> Result<()> {
        let region = {
            let mut slots = self.lock_slots()?;
            let slot = slots.get_mut(handle.index()).ok_or(Error::InvalidParameter)?;
            let region = slot.ok_or(Error::InvalidParameter)?;
            self.restore_defaults(region.range, region.flags.cache_policy())?;
            *slot = None;
            self.active.fetch_sub(1, Ordering::SeqCst);
            region
        };
        self.record(EventCode::RegionReleased, handle, region.range, region.flags);
        Ok(())
    }

    /// Check `access` against the region containing `[addr, addr + size)`
    ///
    /// Grants are counted but not audited.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the range is empty, overflows or is
    ///   not inside a single region (unmanaged memory is not denied, it is
    ///   simply not protected)
    /// - [`Error::Permission`] if `access` is not a subset of the region's
    ///   flags; always audited
    pub fn verify_access(&self, addr: u64, size: u64, access: RegionFlags) -> Result<()> {
        let range = AddressRange::new(addr, size).ok_or(Error::InvalidParameter)?;
        let granted = {
            let mut slots = self.lock_slots()?;
            let region = slots
                .iter_mut()
                .flatten()
                .find(|r| r.range.contains(&range))
                .ok_or(Error::InvalidParameter)?;
            region.access_count += 1;
            region.last_access = Some(self.clock.now());
            self.checks.fetch_add(1, Ordering::Relaxed);
            let granted = region.flags.contains(access);
            if !granted {
                region.violation_count += 1;
                self.violations.fetch_add(1, Ordering::Relaxed);
            }
            granted
        };
        if granted {
            Ok(())
        } else {
            tracing::warn!(addr, size, access = access.bits(), "access denied");
            Err(audit_error(
                &self.ledger,
                Error::Permission,
                AuditClass::System,
                EventCode::AccessDenied,
                addr,
            ))
        }
    }

    /// Snapshot of the region containing `addr`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the table lock times out.
    pub fn query(&self, addr: u64) -> Result<Option<RegionInfo>> {
        let slots = self.lock_slots()?;
        let found = slots.iter().enumerate().find_map(|(index, slot)| {
            let region = slot.as_ref()?;
            let inside = addr >= region.range.base && addr < region.range.end();
            let handle = RegionHandle::new(u16::try_from(index).ok()?);
            inside.then(|| region.info(handle))
        });
        Ok(found)
    }

    /// Snapshot of a region by handle
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an unknown handle.
    pub fn info(&self, handle: RegionHandle) -> Result<RegionInfo> {
        let slots = self.lock_slots()?;
        slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .map(|r| r.info(handle))
            .ok_or(Error::InvalidParameter)
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> ProtectionStats {
        ProtectionStats {
            active_regions: self.active.load(Ordering::SeqCst),
            capacity: self.capacity,
            total_checks: self.checks.load(Ordering::Relaxed),
            total_violations: self.violations.load(Ordering::Relaxed),
            enabled_features: self.caps.enabled().bits(),
        }
    }

    /// Remove every region, restore defaults and disable hardware features
    ///
    /// Teardown only. Every region is removed even if the MMU fails on some
    /// of them; the first failure is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if the table lock times out
    /// - The first MMU or feature-disable failure
    #[tracing::instrument(skip(self))]
    pub fn reset(&self) -> Result<usize> {
        let (removed, outcome) = {
            let mut slots = self.lock_slots()?;
            let mut outcome = Ok(());
            let mut removed = 0usize;
            for slot in slots.iter_mut() {
                if let Some(region) = slot.take() {
                    removed += 1;
                    let restored = self.restore_defaults(region.range, region.flags.cache_policy());
                    if outcome.is_ok() {
                        outcome = restored;
                    }
                }
            }
            self.active.store(0, Ordering::SeqCst);
            for feature in self.caps.enabled().iter() {
                if let Err(e) = self.caps.disable(feature) {
                    tracing::error!(feature = feature.name(), error = %e, "failed to disable feature");
                    if outcome.is_ok() {
                        outcome = Err(e.into());
                    }
                }
            }
            self.initialized.store(false, Ordering::SeqCst);
            (removed, outcome)
        };

        let event = AuditEvent::new(AuditClass::System, Severity::Info, EventCode::TableReset)
            .with_payload((removed as u64).to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record table reset");
        }
        tracing::info!(removed, "protection table reset");
        outcome.map(|()| removed)
    }
}

impl core::fmt::Debug for ProtectionTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProtectionTable")
            .field("capacity", &self.capacity)
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
