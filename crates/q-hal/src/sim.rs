// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated host platform
//!
//! Software models of the root of trust and MMU, used on development hosts
//! and in tests. Both support fault injection so timeout and failure paths
//! can be exercised deterministically.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use q_crypto::hash::Sha3_512;
use q_crypto::{Digest512, Hash, SignatureAlgorithm};

use crate::error::{HalError, HalResult};
use crate::traits::{MmuControl, RootOfTrust};
use crate::types::{
    AddressRange, CachePolicy, PagePermissions, RotCapabilities, HASH_SHA3_512,
};

/// Default register count of the simulated device
pub const SIM_REGISTER_COUNT: u32 = 24;

/// Software root of trust
#[derive(Debug)]
pub struct SimRootOfTrust {
    capabilities: RotCapabilities,
    registers: Mutex<Vec<Digest512>>,
    seed: [u8; 32],
    counter: AtomicU64,
    present: AtomicBool,
    pending_timeouts: AtomicU32,
    fault: AtomicBool,
    constant_entropy: AtomicBool,
}

impl SimRootOfTrust {
    /// Capabilities of a fully featured simulated device
    pub const CAPABILITIES: RotCapabilities = RotCapabilities {
        version: 0x20,
        hash_algorithms: HASH_SHA3_512,
        signature_algorithms: SignatureAlgorithm::Ed25519.capability_bit(),
        register_count: SIM_REGISTER_COUNT,
    };

    /// Create a device seeded for its entropy source
    #[must_use]
    pub fn new(seed: [u8; 32]) -> Self {
        Self::with_capabilities(seed, Self::CAPABILITIES)
    }

    /// Create a device advertising `capabilities`
    #[must_use]
    pub fn with_capabilities(seed: [u8; 32], capabilities: RotCapabilities) -> Self {
        let count = usize::try_from(capabilities.register_count).unwrap_or(0);
        Self {
            capabilities,
            registers: Mutex::new(vec![Digest512::ZERO; count]),
            seed,
            counter: AtomicU64::new(0),
            present: AtomicBool::new(true),
            pending_timeouts: AtomicU32::new(0),
            fault: AtomicBool::new(false),
            constant_entropy: AtomicBool::new(false),
        }
    }

    /// Make the device disappear from the bus
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    /// Time out the next `n` extend calls
    pub fn inject_timeouts(&self, n: u32) {
        self.pending_timeouts.store(n, Ordering::SeqCst);
    }

    /// Fail every subsequent call with a hardware fault
    pub fn inject_fault(&self, fault: bool) {
        self.fault.store(fault, Ordering::SeqCst);
    }

    /// Make the entropy source return a constant
    pub fn inject_stuck_entropy(&self, stuck: bool) {
        self.constant_entropy.store(stuck, Ordering::SeqCst);
    }

    fn check_bus(&self) -> HalResult<()> {
        if !self.present.load(Ordering::SeqCst) {
            return Err(HalError::NotPresent);
        }
        if self.fault.load(Ordering::SeqCst) {
            return Err(HalError::HardwareFault);
        }
        Ok(())
    }

    fn index(&self, index: u32) -> HalResult<usize> {
        if index >= self.capabilities.register_count {
            return Err(HalError::InvalidIndex);
        }
        usize::try_from(index).map_err(|_| HalError::InvalidIndex)
    }
}

impl RootOfTrust for SimRootOfTrust {
    fn probe(&self) -> HalResult<RotCapabilities> {
        self.check_bus()?;
        Ok(self.capabilities)
    }

    fn extend(&self, index: u32, digest: &Digest512) -> HalResult<Digest512> {
        self.check_bus()?;
        let slot = self.index(index)?;
        let timed_out = self
            .pending_timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if timed_out {
            return Err(HalError::Timeout);
        }

        let mut registers = self.registers.lock();
        let register = registers.get_mut(slot).ok_or(HalError::InvalidIndex)?;
        *register = register.extend(digest);
        Ok(*register)
    }

    fn read_register(&self, index: u32) -> HalResult<Digest512> {
        self.check_bus()?;
        let slot = self.index(index)?;
        self.registers
            .lock()
            .get(slot)
            .copied()
            .ok_or(HalError::InvalidIndex)
    }

    fn get_random(&self, dest: &mut [u8]) -> HalResult<()> {
        self.check_bus()?;
        if self.constant_entropy.load(Ordering::SeqCst) {
            dest.fill(0);
            return Ok(());
        }
        for chunk in dest.chunks_mut(64) {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let mut hasher = Sha3_512::new();
            hasher.update(&self.seed);
            hasher.update(&n.to_le_bytes());
            let block = hasher.finalize();
            chunk.copy_from_slice(&block.as_bytes()[..chunk.len()]);
        }
        Ok(())
    }
}

/// One recorded MMU operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuOp {
    /// `set_permissions`
    SetPermissions(AddressRange, PagePermissions),
    /// `invalidate_translation`
    Invalidate(AddressRange),
    /// `set_cache_policy`
    SetCachePolicy(AddressRange, CachePolicy),
    /// `barrier`
    Barrier,
}

/// Software MMU recording every operation
#[derive(Debug, Default)]
pub struct SimMmu {
    ops: Mutex<Vec<MmuOp>>,
    fail_permissions: AtomicBool,
}

impl SimMmu {
    /// Create an empty MMU model
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set_permissions` fail with a hardware fault
    pub fn inject_fault(&self, fail: bool) {
        self.fail_permissions.store(fail, Ordering::SeqCst);
    }

    /// Operations recorded so far
    #[must_use]
    pub fn ops(&self) -> Vec<MmuOp> {
        self.ops.lock().clone()
    }

    /// Forget recorded operations
    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

impl MmuControl for SimMmu {
    fn set_permissions(&self, range: AddressRange, perm: PagePermissions) -> HalResult<()> {
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(HalError::HardwareFault);
        }
        self.ops.lock().push(MmuOp::SetPermissions(range, perm));
        Ok(())
    }

    fn invalidate_translation(&self, range: AddressRange) -> HalResult<()> {
        self.ops.lock().push(MmuOp::Invalidate(range));
        Ok(())
    }

    fn set_cache_policy(&self, range: AddressRange, policy: CachePolicy) -> HalResult<()> {
        self.ops.lock().push(MmuOp::SetCachePolicy(range, policy));
        Ok(())
    }

    fn barrier(&self) {
        core::sync::atomic::fence(Ordering::SeqCst);
        self.ops.lock().push(MmuOp::Barrier);
    }
}
