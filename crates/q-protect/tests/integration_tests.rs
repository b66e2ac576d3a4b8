// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-protect

use std::sync::Arc;

use q_audit::AuditLedger;
use q_common::config::{AuditConfig, ProtectConfig};
use q_common::time::ManualClock;
use q_common::{Clock, Error};
use q_crypto::SecureBuffer;
use q_hal::sim::SimMmu;
use q_hal::HardwareCapabilities;
use q_protect::{ProtectionTable, RegionFlags, RegionSpec};

fn table_with(caps: Arc<dyn HardwareCapabilities>) -> (Arc<ProtectionTable>, Arc<AuditLedger>) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
    let ledger = Arc::new(
        AuditLedger::new(&AuditConfig::DEFAULT, &SecureBuffer::from_array([4; 32]), clock.clone())
            .unwrap(),
    );
    let table = ProtectionTable::new(
        &ProtectConfig::DEFAULT,
        Arc::new(SimMmu::new()),
        caps,
        ledger.clone(),
        clock,
    )
    .unwrap();
    table.init().unwrap();
    (Arc::new(table), ledger)
}

fn table() -> (Arc<ProtectionTable>, Arc<AuditLedger>) {
    table_with(Arc::new(q_hal::caps::StaticCapabilities::new(
        q_hal::ProtectionFeatures::EMPTY,
    )))
}

mod access_tests {
    use super::*;
    use q_audit::{AuditClass, EventCode};

    #[test]
    fn test_read_write_region_denies_execute() {
        let (table, ledger) = table();
        table
            .protect(RegionSpec::new(0x1000, 4096), RegionFlags::READ | RegionFlags::WRITE)
            .unwrap();
        assert_eq!(
            table.verify_access(0x1000, 4096, RegionFlags::EXEC),
            Err(Error::Permission)
        );
        table.verify_access(0x1000, 4096, RegionFlags::READ).unwrap();

        let denial = ledger
            .records()
            .unwrap()
            .into_iter()
            .find(|r| r.code == EventCode::AccessDenied)
            .unwrap();
        assert_eq!(denial.class, AuditClass::Security);
        assert_eq!(denial.correlation, 0x1000);
    }

    #[test]
    fn test_range_straddling_two_regions_is_unmanaged() {
        let (table, _) = table();
        table.protect(RegionSpec::new(0x1000, 0x1000), RegionFlags::READ).unwrap();
        table.protect(RegionSpec::new(0x2000, 0x1000), RegionFlags::READ).unwrap();
        assert_eq!(
            table.verify_access(0x1800, 0x1000, RegionFlags::READ),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_query_by_address() {
        let (table, _) = table();
        let handle = table
            .protect(RegionSpec::new(0x1000, 0x1000).with_owner(7), RegionFlags::READ)
            .unwrap();
        let info = table.query(0x1FFF).unwrap().unwrap();
        assert_eq!(info.handle, handle);
        assert_eq!(info.owner, 7);
        assert!(table.query(0x2000).unwrap().is_none());
    }

    #[test]
    fn test_lifecycle_is_audited() {
        let (table, ledger) = table();
        let handle = table.protect(RegionSpec::new(0x1000, 0x100), RegionFlags::READ).unwrap();
        table.update_protection(handle, RegionFlags::READ | RegionFlags::WRITE).unwrap();
        table.release(handle).unwrap();
        table.reset().unwrap();
        let codes: Vec<EventCode> = ledger.records().unwrap().iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![
                EventCode::RegionProtected,
                EventCode::RegionUpdated,
                EventCode::RegionReleased,
                EventCode::TableReset,
            ]
        );
    }
}

mod dma_tests {
    use super::*;
    use q_audit::EventCode;
    use q_protect::DmaRequest;

    fn dma_table() -> (Arc<ProtectionTable>, Arc<AuditLedger>) {
        let (table, ledger) = table();
        table
            .protect(
                RegionSpec::new(0x8000_0000, 0x1_0000).with_device_mask(0x00FF_FFFF),
                RegionFlags::READ | RegionFlags::WRITE | RegionFlags::DMA,
            )
            .unwrap();
        table.protect(RegionSpec::new(0x1000, 0x1000), RegionFlags::READ).unwrap();
        (table, ledger)
    }

    fn request(device_addr: u64, target: u64, verify: bool) -> DmaRequest {
        DmaRequest {
            device_addr,
            target,
            size: 0x100,
            access: RegionFlags::WRITE,
            verify,
        }
    }

    #[test]
    fn test_device_inside_mask() {
        let (table, _) = dma_table();
        let grant = table.check_dma(&request(0x0010_0000, 0x8000_0000, false)).unwrap();
        assert!(!grant.verify);
        table.verify_transfer(&grant, b"abc", b"xyz").unwrap();
    }

    #[test]
    fn test_device_outside_mask() {
        let (table, ledger) = dma_table();
        assert_eq!(
            table.check_dma(&request(0x0100_0000, 0x8000_0000, false)),
            Err(Error::Permission)
        );
        let last = ledger.records().unwrap().into_iter().last().unwrap();
        assert_eq!(last.code, EventCode::DmaDenied);
    }

    #[test]
    fn test_region_without_dma_flag() {
        let (table, _) = dma_table();
        assert_eq!(
            table.check_dma(&request(0x10, 0x1000, false)),
            Err(Error::Permission)
        );
    }

    #[test]
    fn test_verified_transfer() {
        let (table, ledger) = dma_table();
        let grant = table.check_dma(&request(0x20, 0x8000_0100, true)).unwrap();
        let payload = [0xA5u8; 256];
        table.verify_transfer(&grant, &payload, &payload).unwrap();

        let mut corrupted = payload;
        corrupted[200] ^= 1;
        assert_eq!(
            table.verify_transfer(&grant, &payload, &corrupted),
            Err(Error::IntegrityViolation)
        );
        assert_eq!(
            table.verify_transfer(&grant, &payload, &payload[..255]),
            Err(Error::IntegrityViolation)
        );
        let failures = ledger
            .records()
            .unwrap()
            .iter()
            .filter(|r| r.code == EventCode::DmaVerifyFailed && r.critical)
            .count();
        assert_eq!(failures, 2);
    }
}

mod hardware_tests {
    use super::*;
    use q_hal::caps::{Armv8Capabilities, Armv8IdRegisters, X86Capabilities, X86CpuidWords};
    use q_hal::ProtectionFeature;

    #[test]
    fn test_x86_features_enabled_then_disabled() {
        let caps = Arc::new(X86Capabilities::from_cpuid(X86CpuidWords {
            ext1_edx: 1 << 20,
            leaf7_ebx: (1 << 7) | (1 << 20),
            leaf7_ecx: 0,
        }));
        let (table, _) = table_with(caps.clone());
        let enabled = caps.enabled();
        assert!(enabled.contains(ProtectionFeature::Nx));
        assert!(enabled.contains(ProtectionFeature::Smap));
        assert!(!enabled.contains(ProtectionFeature::Cet));
        assert_eq!(table.stats().enabled_features, enabled.bits());

        table.reset().unwrap();
        assert!(caps.enabled().is_empty());
        assert_eq!(caps.control_registers(), (0, 0));
    }

    #[test]
    fn test_armv8_without_features() {
        let caps = Arc::new(Armv8Capabilities::from_id_registers(Armv8IdRegisters::default()));
        let (table, _) = table_with(caps.clone());
        assert!(caps.enabled().is_empty());
        assert!(table
            .protect(RegionSpec::new(0x1000, 0x1000), RegionFlags::READ)
            .is_ok());
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn test_checks_race_with_updates() {
        let (table, _) = table();
        let handle = table
            .protect(RegionSpec::new(0x10_0000, 0x1000), RegionFlags::READ)
            .unwrap();

        let checker = {
            let table = table.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let outcome = table.verify_access(0x10_0000, 0x10, RegionFlags::READ);
                    assert!(matches!(outcome, Ok(()) | Err(Error::Busy)));
                }
            })
        };
        let adder = {
            let table = table.clone();
            std::thread::spawn(move || {
                for i in 0..64u64 {
                    let base = 0x20_0000 + i * 0x1000;
                    table.protect(RegionSpec::new(base, 0x1000), RegionFlags::READ).unwrap();
                }
            })
        };
        for _ in 0..50 {
            table
                .update_protection(handle, RegionFlags::READ | RegionFlags::WRITE)
                .unwrap();
        }
        checker.join().unwrap();
        adder.join().unwrap();
        assert_eq!(table.stats().active_regions, 65);
    }
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn access_bits() -> impl Strategy<Value = u32> {
        0u32..8
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_subset_granted_superset_denied(
            pages in proptest::collection::btree_set(1u64..256, 1..8),
            granted in access_bits(),
            requested in access_bits(),
        ) {
            let (table, _) = table();
            let flags = RegionFlags::from_bits(granted).unwrap();
            let access = RegionFlags::from_bits(requested).unwrap();
            for page in &pages {
                table.protect(RegionSpec::new(page * 0x1000, 0x1000), flags).unwrap();
            }
            for page in &pages {
                let outcome = table.verify_access(page * 0x1000, 0x1000, access);
                if flags.contains(access) {
                    prop_assert_eq!(outcome, Ok(()));
                } else {
                    prop_assert_eq!(outcome, Err(Error::Permission));
                }
            }
        }
    }
}
