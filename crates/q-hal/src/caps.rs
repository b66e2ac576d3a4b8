// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Per-platform protection feature decoders
//!
//! Each variant turns the platform's raw identification registers into a
//! [`ProtectionFeatures`] set. Enabling a feature updates a shadow of the
//! relevant control register; the privileged write itself belongs to the
//! platform's early-boot code, which programs the shadow on the next
//! context switch.
//!
//! | Feature | x86-64                   | AArch64                     |
//! |---------|--------------------------|-----------------------------|
//! | NX      | CPUID 8000_0001 EDX[20]  | always (XN)                 |
//! | SMEP    | CPUID 7 EBX[7]           | always (PXN)                |
//! | SMAP    | CPUID 7 EBX[20]          | ID_AA64MMFR1 PAN != 0       |
//! | PKU     | CPUID 7 ECX[3]           | ID_AA64MMFR3 S1POE != 0     |
//! | CET     | CPUID 7 ECX[7]           | ID_AA64PFR1 BT != 0         |

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::error::{HalError, HalResult};
use crate::traits::HardwareCapabilities;
use crate::types::{Platform, ProtectionFeature, ProtectionFeatures};

/// Enabled-set bookkeeping shared by the variants
#[derive(Debug, Default)]
struct FeatureState {
    present: ProtectionFeatures,
    enabled: AtomicU8,
}

impl FeatureState {
    fn new(present: ProtectionFeatures) -> Self {
        Self {
            present,
            enabled: AtomicU8::new(0),
        }
    }

    fn set(&self, feature: ProtectionFeature, on: bool) -> HalResult<()> {
        if on && !self.present.contains(feature) {
            return Err(HalError::NotSupported);
        }
        let bit = ProtectionFeatures::EMPTY.with(feature).bits();
        if on {
            self.enabled.fetch_or(bit, Ordering::SeqCst);
        } else {
            self.enabled.fetch_and(!bit, Ordering::SeqCst);
        }
        Ok(())
    }

    fn enabled(&self) -> ProtectionFeatures {
        ProtectionFeatures::from_bits(self.enabled.load(Ordering::SeqCst))
    }
}

// =============================================================================
// x86-64
// =============================================================================

/// CR4.SMEP
pub const CR4_SMEP: u64 = 1 << 20;
/// CR4.SMAP
pub const CR4_SMAP: u64 = 1 << 21;
/// CR4.PKE
pub const CR4_PKE: u64 = 1 << 22;
/// CR4.CET
pub const CR4_CET: u64 = 1 << 23;
/// EFER.NXE
pub const EFER_NXE: u64 = 1 << 11;

/// Raw CPUID words relevant to memory protection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86CpuidWords {
    /// Leaf 0x8000_0001, EDX
    pub ext1_edx: u32,
    /// Leaf 7 subleaf 0, EBX
    pub leaf7_ebx: u32,
    /// Leaf 7 subleaf 0, ECX
    pub leaf7_ecx: u32,
}

/// x86-64 protection features
#[derive(Debug)]
pub struct X86Capabilities {
    state: FeatureState,
    cr4: AtomicU64,
    efer: AtomicU64,
}

impl X86Capabilities {
    /// Decode from CPUID words
    #[must_use]
    pub fn from_cpuid(words: X86CpuidWords) -> Self {
        let mut present = ProtectionFeatures::EMPTY;
        if words.ext1_edx & (1 << 20) != 0 {
            present = present.with(ProtectionFeature::Nx);
        }
        if words.leaf7_ebx & (1 << 7) != 0 {
            present = present.with(ProtectionFeature::Smep);
        }
        if words.leaf7_ebx & (1 << 20) != 0 {
            present = present.with(ProtectionFeature::Smap);
        }
        if words.leaf7_ecx & (1 << 3) != 0 {
            present = present.with(ProtectionFeature::Pku);
        }
        if words.leaf7_ecx & (1 << 7) != 0 {
            present = present.with(ProtectionFeature::Cet);
        }
        Self {
            state: FeatureState::new(present),
            cr4: AtomicU64::new(0),
            efer: AtomicU64::new(0),
        }
    }

    /// Shadow values of CR4 and EFER
    #[must_use]
    pub fn control_registers(&self) -> (u64, u64) {
        (self.cr4.load(Ordering::SeqCst), self.efer.load(Ordering::SeqCst))
    }

    fn shadow(&self, feature: ProtectionFeature) -> (&AtomicU64, u64) {
        match feature {
            ProtectionFeature::Nx => (&self.efer, EFER_NXE),
            ProtectionFeature::Smep => (&self.cr4, CR4_SMEP),
            ProtectionFeature::Smap => (&self.cr4, CR4_SMAP),
            ProtectionFeature::Pku => (&self.cr4, CR4_PKE),
            ProtectionFeature::Cet => (&self.cr4, CR4_CET),
        }
    }

    fn write_shadow(&self, feature: ProtectionFeature, on: bool) {
        let (register, bit) = self.shadow(feature);
        if on {
            register.fetch_or(bit, Ordering::SeqCst);
        } else {
            register.fetch_and(!bit, Ordering::SeqCst);
        }
    }
}

impl HardwareCapabilities for X86Capabilities {
    fn platform(&self) -> Platform {
        Platform::X86_64
    }

    fn probe(&self) -> ProtectionFeatures {
        self.state.present
    }

    fn enable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, true)?;
        self.write_shadow(feature, true);
        Ok(())
    }

    fn disable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, false)?;
        self.write_shadow(feature, false);
        Ok(())
    }

    fn enabled(&self) -> ProtectionFeatures {
        self.state.enabled()
    }
}

// =============================================================================
// AArch64
// =============================================================================

/// Raw ID register values relevant to memory protection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Armv8IdRegisters {
    /// ID_AA64MMFR1_EL1
    pub mmfr1: u64,
    /// ID_AA64MMFR3_EL1
    pub mmfr3: u64,
    /// ID_AA64PFR1_EL1
    pub pfr1: u64,
}

/// AArch64 protection features
#[derive(Debug)]
pub struct Armv8Capabilities {
    state: FeatureState,
}

impl Armv8Capabilities {
    /// Decode from ID registers
    #[must_use]
    pub fn from_id_registers(regs: Armv8IdRegisters) -> Self {
        let field = |value: u64, shift: u32| (value >> shift) & 0xF;

        let mut present = ProtectionFeatures::EMPTY
            .with(ProtectionFeature::Nx)
            .with(ProtectionFeature::Smep);
        if field(regs.mmfr1, 20) != 0 {
            present = present.with(ProtectionFeature::Smap);
        }
        if field(regs.mmfr3, 16) != 0 {
            present = present.with(ProtectionFeature::Pku);
        }
        if field(regs.pfr1, 0) != 0 {
            present = present.with(ProtectionFeature::Cet);
        }
        Self {
            state: FeatureState::new(present),
        }
    }
}

impl HardwareCapabilities for Armv8Capabilities {
    fn platform(&self) -> Platform {
        Platform::Aarch64
    }

    fn probe(&self) -> ProtectionFeatures {
        self.state.present
    }

    fn enable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, true)
    }

    fn disable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, false)
    }

    fn enabled(&self) -> ProtectionFeatures {
        self.state.enabled()
    }
}

// =============================================================================
// Static
// =============================================================================

/// Fixed feature set, for simulation
#[derive(Debug, Default)]
pub struct StaticCapabilities {
    state: FeatureState,
}

impl StaticCapabilities {
    /// Advertise exactly `present`
    #[must_use]
    pub fn new(present: ProtectionFeatures) -> Self {
        Self {
            state: FeatureState::new(present),
        }
    }
}

impl HardwareCapabilities for StaticCapabilities {
    fn platform(&self) -> Platform {
        Platform::Simulated
    }

    fn probe(&self) -> ProtectionFeatures {
        self.state.present
    }

    fn enable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, true)
    }

    fn disable(&self, feature: ProtectionFeature) -> HalResult<()> {
        self.state.set(feature, false)
    }

    fn enabled(&self) -> ProtectionFeatures {
        self.state.enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x86_decode() {
        let caps = X86Capabilities::from_cpuid(X86CpuidWords {
            ext1_edx: 1 << 20,
            leaf7_ebx: (1 << 7) | (1 << 20),
            leaf7_ecx: 0,
        });
        let present = caps.probe();
        assert!(present.contains(ProtectionFeature::Nx));
        assert!(present.contains(ProtectionFeature::Smep));
        assert!(present.contains(ProtectionFeature::Smap));
        assert!(!present.contains(ProtectionFeature::Pku));
        assert!(!present.contains(ProtectionFeature::Cet));
    }

    #[test]
    fn test_x86_shadow_registers() {
        let caps = X86Capabilities::from_cpuid(X86CpuidWords {
            ext1_edx: 1 << 20,
            leaf7_ebx: 1 << 7,
            leaf7_ecx: 0,
        });
        caps.enable(ProtectionFeature::Nx).unwrap();
        caps.enable(ProtectionFeature::Smep).unwrap();
        assert_eq!(caps.control_registers(), (CR4_SMEP, EFER_NXE));

        caps.disable(ProtectionFeature::Smep).unwrap();
        assert_eq!(caps.control_registers(), (0, EFER_NXE));
    }

    #[test]
    fn test_enable_absent_feature() {
        let caps = X86Capabilities::from_cpuid(X86CpuidWords::default());
        assert_eq!(caps.enable(ProtectionFeature::Pku), Err(HalError::NotSupported));
        assert!(caps.enabled().is_empty());
    }

    #[test]
    fn test_armv8_decode() {
        let caps = Armv8Capabilities::from_id_registers(Armv8IdRegisters {
            mmfr1: 1 << 20,
            mmfr3: 0,
            pfr1: 1,
        });
        let present = caps.probe();
        assert!(present.contains(ProtectionFeature::Smap));
        assert!(present.contains(ProtectionFeature::Cet));
        assert!(!present.contains(ProtectionFeature::Pku));
        assert_eq!(caps.platform(), Platform::Aarch64);
    }
}
