// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL trait definitions
//!
//! Platform-agnostic contracts for the hardware the trust core consumes.
//! Every method takes `&self`: implementations serialize their own bus
//! access, so a single instance can be shared between components.

use q_crypto::Digest512;

use crate::error::HalResult;
use crate::types::{
    AddressRange, CachePolicy, PagePermissions, Platform, ProtectionFeature, ProtectionFeatures,
    RotCapabilities,
};

/// Hardware root of trust
///
/// Registers are one-way accumulators: the only mutation is
/// `new = H(old || digest)`, performed by the device.
pub trait RootOfTrust: Send + Sync {
    /// Query version and algorithm support
    fn probe(&self) -> HalResult<RotCapabilities>;

    /// Accumulate `digest` into register `index`, returning the new value
    fn extend(&self, index: u32, digest: &Digest512) -> HalResult<Digest512>;

    /// Read the current value of register `index`
    fn read_register(&self, index: u32) -> HalResult<Digest512>;

    /// Fill `dest` from the device entropy source
    fn get_random(&self, dest: &mut [u8]) -> HalResult<()>;
}

/// MMU and memory-control surface
pub trait MmuControl: Send + Sync {
    /// Set page permissions for a range
    fn set_permissions(&self, range: AddressRange, perm: PagePermissions) -> HalResult<()>;

    /// Invalidate cached translations covering a range
    fn invalidate_translation(&self, range: AddressRange) -> HalResult<()>;

    /// Apply a cache policy to a range
    fn set_cache_policy(&self, range: AddressRange, policy: CachePolicy) -> HalResult<()>;

    /// Full memory and instruction synchronization barrier
    fn barrier(&self) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// Optional hardware protection features
pub trait HardwareCapabilities: Send + Sync {
    /// Platform this implementation targets
    fn platform(&self) -> Platform;

    /// Features present on this CPU
    fn probe(&self) -> ProtectionFeatures;

    /// Turn a present feature on
    fn enable(&self, feature: ProtectionFeature) -> HalResult<()>;

    /// Turn a feature off
    fn disable(&self, feature: ProtectionFeature) -> HalResult<()>;

    /// Features currently enabled
    fn enabled(&self) -> ProtectionFeatures;
}
