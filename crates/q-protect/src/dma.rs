// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! DMA sub-policy
//!
//! A DMA-capable region carries a device-address mask. A device address `a`
//! may target the region only if `a & !mask == 0`, which bounds where a
//! compromised device can reach.

use std::sync::atomic::Ordering;

use q_audit::{audit_error, AuditClass, EventCode};
use q_common::{Error, Result};
use q_crypto::constant_time_eq;
use q_hal::AddressRange;

use crate::flags::RegionFlags;
use crate::region::RegionHandle;
use crate::table::ProtectionTable;

/// A device transfer to be checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRequest {
    /// Device-visible start address
    pub device_addr: u64,
    /// Physical address targeted
    pub target: u64,
    /// Transfer length in bytes
    pub size: u64,
    /// Access the device performs (DMA is implied)
    pub access: RegionFlags,
    /// Compare source and destination after the transfer
    pub verify: bool,
}

/// Permission to perform a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaGrant {
    /// Region the transfer lands in
    pub handle: RegionHandle,
    /// Whether [`ProtectionTable::verify_transfer`] must run afterwards
    pub verify: bool,
}

/// Whether every address in `range` satisfies `a & !mask == 0`
fn within_mask(range: AddressRange, mask: u64) -> bool {
    let (first, last) = (range.base, range.last());
    if (first | last) & !mask != 0 {
        return false;
    }
    // Addresses between first and last take every bit below their highest
    // differing bit.
    let spanned = match first ^ last {
        0 => 0,
        diff => u64::MAX >> diff.leading_zeros(),
    };
    spanned & !mask == 0
}

impl ProtectionTable {
    /// Check a device transfer against the DMA sub-policy
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] on an empty or overflowing range, or a
    ///   target outside every region
    /// - [`Error::Permission`] if the region is not DMA-capable, the access
    ///   exceeds its flags or the device range leaves the mask; audited
    pub fn check_dma(&self, request: &DmaRequest) -> Result<DmaGrant> {
        let target = AddressRange::new(request.target, request.size).ok_or(Error::InvalidParameter)?;
        let device =
            AddressRange::new(request.device_addr, request.size).ok_or(Error::InvalidParameter)?;
        let access = request.access.union(RegionFlags::DMA);

        let granted = {
            let mut slots = self.lock_slots()?;
            let (index, region) = slots
                .iter_mut()
                .enumerate()
                .find_map(|(i, slot)| slot.as_mut().filter(|r| r.range.contains(&target)).map(|r| (i, r)))
                .ok_or(Error::InvalidParameter)?;
            region.access_count += 1;
            region.last_access = Some(self.clock.now());
            self.checks.fetch_add(1, Ordering::Relaxed);

            let allowed = region.flags.contains(access)
                && region.device_mask.is_some_and(|mask| within_mask(device, mask));
            if allowed {
                u16::try_from(index).ok().map(RegionHandle::new)
            } else {
                region.violation_count += 1;
                self.violations.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        match granted {
            Some(handle) => Ok(DmaGrant {
                handle,
                verify: request.verify,
            }),
            None => {
                tracing::warn!(
                    device = request.device_addr,
                    target = request.target,
                    size = request.size,
                    "dma denied"
                );
                Err(audit_error(
                    &self.ledger,
                    Error::Permission,
                    AuditClass::Hardware,
                    EventCode::DmaDenied,
                    request.device_addr,
                ))
            }
        }
    }

    /// Post-transfer comparison for grants that asked for it
    ///
    /// A grant without `verify` passes without reading either buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] if the buffers differ in length
    /// or content; audited.
    pub fn verify_transfer(&self, grant: &DmaGrant, src: &[u8], dst: &[u8]) -> Result<()> {
        if !grant.verify {
            return Ok(());
        }
        if src.len() == dst.len() && constant_time_eq(src, dst) {
            return Ok(());
        }
        tracing::error!(handle = %grant.handle, len = src.len(), "dma transfer verification failed");
        Err(audit_error(
            &self.ledger,
            Error::IntegrityViolation,
            AuditClass::Hardware,
            EventCode::DmaVerifyFailed,
            u64::from(grant.handle.raw()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(base: u64, size: u64) -> AddressRange {
        AddressRange::new(base, size).unwrap()
    }

    #[test]
    fn test_within_low_mask() {
        assert!(within_mask(range(0x0000, 0x1000), 0xFFFF));
        assert!(within_mask(range(0xF000, 0x1000), 0xFFFF));
        assert!(!within_mask(range(0xF000, 0x1001), 0xFFFF));
    }

    #[test]
    fn test_within_sparse_mask() {
        let mask = 0xFF00_00FF;
        assert!(within_mask(range(0xFF00_0000, 0x100), mask));
        // 0x10..0x1FF passes bit 8, which the mask lacks
        assert!(!within_mask(range(0xFF00_0010, 0x1F0), mask));
        assert!(within_mask(range(0x0100_0000, 1), mask));
    }
}
