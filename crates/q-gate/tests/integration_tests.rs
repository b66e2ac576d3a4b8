// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-gate

use std::sync::Arc;

use q_audit::{AuditClass, AuditLedger};
use q_common::config::{AuditConfig, GateConfig};
use q_common::time::ManualClock;
use q_common::Error;
use q_crypto::SecureBuffer;
use q_gate::{CapabilityGate, PolicyFlags, Rights, Rule, SecurityPolicy};

fn setup() -> (CapabilityGate, Arc<AuditLedger>) {
    let ledger = Arc::new(
        AuditLedger::new(
            &AuditConfig::DEFAULT,
            &SecureBuffer::from_array([6; 32]),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap(),
    );
    let gate = CapabilityGate::new(&GateConfig::DEFAULT, ledger.clone()).unwrap();
    (gate, ledger)
}

fn security_records(ledger: &AuditLedger) -> usize {
    ledger
        .records()
        .unwrap()
        .iter()
        .filter(|r| r.class == AuditClass::Security)
        .count()
}

mod policy_check_tests {
    use super::*;
    use q_audit::EventCode;

    #[test]
    fn test_non_enforcing_policy_denies_everything() {
        let (gate, ledger) = setup();
        gate.install(vec![SecurityPolicy::enforcing(4, "monitor", Rule::AllowList(Rights::ALL))
            .with_flags(PolicyFlags::ENABLED | PolicyFlags::AUDITING)])
            .unwrap();
        let ctx = gate.new_context(10, "worker");

        for access in [Rights::NONE, Rights::READ, Rights::ALL] {
            let before = security_records(&ledger);
            assert_eq!(gate.check_policy(&ctx, 4, access), Err(Error::Permission));
            assert_eq!(security_records(&ledger), before + 1);
        }
        let last = ledger.records().unwrap().into_iter().last().unwrap();
        assert_eq!(last.code, EventCode::PolicyNotEnforcing);
        assert_eq!(last.correlation, ctx.correlation());
    }

    #[test]
    fn test_every_outcome_writes_one_record() {
        let (gate, ledger) = setup();
        gate.install(vec![SecurityPolicy::enforcing(1, "ro", Rule::AllowList(Rights::READ))])
            .unwrap();
        let ctx = gate.new_context(1, "svc");

        let cases = [
            (1, Rights::READ, Ok(())),
            (1, Rights::WRITE, Err(Error::Permission)),
            (9, Rights::READ, Err(Error::InvalidParameter)),
            (99, Rights::READ, Err(Error::InvalidParameter)),
        ];
        for (id, access, expected) in cases {
            let before = security_records(&ledger);
            assert_eq!(gate.check_policy(&ctx, id, access), expected);
            assert_eq!(security_records(&ledger), before + 1);
        }
    }

    #[test]
    fn test_custom_rule_sees_context() {
        let (gate, _) = setup();
        let only_admins = Rule::Custom(Arc::new(|ctx: &q_gate::ExecutionContext, _: Rights| {
            ctx.label() == "admin"
        }));
        gate.install(vec![SecurityPolicy::enforcing(2, "admins", only_admins)])
            .unwrap();
        assert!(gate.check_policy(&gate.new_context(1, "admin"), 2, Rights::ALL).is_ok());
        assert_eq!(
            gate.check_policy(&gate.new_context(1, "guest"), 2, Rights::READ),
            Err(Error::Permission)
        );
    }
}

mod authorize_tests {
    use super::*;
    use q_audit::EventCode;

    #[test]
    fn test_both_checks_must_agree() {
        let (gate, ledger) = setup();
        gate.install(vec![SecurityPolicy::enforcing(1, "no-exec", Rule::DenyList(Rights::EXEC))])
            .unwrap();
        let mut ctx = gate.new_context(3, "svc");
        gate.enter_restricted(&mut ctx, Rights::READ | Rights::EXEC).unwrap();

        gate.authorize(&ctx, 7, 1, Rights::READ).unwrap();
        // capability allows, policy denies
        assert_eq!(gate.authorize(&ctx, 7, 1, Rights::EXEC), Err(Error::Permission));
        // policy allows, capability denies
        assert_eq!(gate.authorize(&ctx, 7, 1, Rights::WRITE), Err(Error::Permission));
        let last = ledger.records().unwrap().into_iter().last().unwrap();
        assert_eq!(last.code, EventCode::CapabilityDenied);
    }

    #[test]
    fn test_handle_limit_applies() {
        let (gate, _) = setup();
        gate.install(vec![SecurityPolicy::enforcing(1, "any", Rule::DenyList(Rights::NONE))])
            .unwrap();
        let mut ctx = gate.new_context(3, "svc");
        gate.enter_restricted(&mut ctx, Rights::READ | Rights::WRITE).unwrap();
        gate.limit_resource(&mut ctx, 5, Rights::READ).unwrap();

        assert_eq!(gate.authorize(&ctx, 5, 1, Rights::WRITE), Err(Error::Permission));
        gate.authorize(&ctx, 6, 1, Rights::WRITE).unwrap();
    }

    #[test]
    fn test_widening_limit_is_audited() {
        let (gate, ledger) = setup();
        let mut ctx = gate.new_context(3, "svc");
        gate.enter_restricted(&mut ctx, Rights::READ).unwrap();
        assert_eq!(
            gate.limit_resource(&mut ctx, 1, Rights::READ | Rights::MMAP),
            Err(Error::Permission)
        );
        let last = ledger.records().unwrap().into_iter().last().unwrap();
        assert_eq!(last.code, EventCode::LimitDenied);
        assert!(last.critical);
        assert_eq!(
            gate.enter_restricted(&mut ctx, Rights::ALL),
            Err(Error::InvalidParameter)
        );
    }
}

mod source_tests {
    use super::*;
    use q_gate::TomlPolicySource;
    use std::io::Write;

    const POLICIES: &str = r#"
        [[policy]]
        id = 0
        name = "storage"
        flags = ["enabled", "enforcing"]
        allow = ["read", "write", "seek"]

        [[policy]]
        id = 1
        name = "devices"
        flags = ["enabled", "enforcing", "critical"]
        priority = 5
        deny = ["ioctl"]
    "#;

    #[test]
    fn test_reload_swaps_registry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POLICIES.as_bytes()).unwrap();
        let (gate, _) = setup();
        let gate = gate.with_source(Arc::new(TomlPolicySource::new(file.path())));

        assert_eq!(gate.reload().unwrap(), 2);
        let ctx = gate.new_context(1, "svc");
        gate.check_policy(&ctx, 0, Rights::SEEK).unwrap();
        assert_eq!(gate.check_policy(&ctx, 1, Rights::IOCTL), Err(Error::Permission));

        std::fs::write(file.path(), "[[policy]]\nid = 0\nname = \"x\"\nallow = 1\n").unwrap();
        assert_eq!(gate.reload().unwrap(), 1);
        assert_eq!(gate.check_policy(&ctx, 1, Rights::READ), Err(Error::InvalidParameter));
        assert_eq!(gate.generation(), 2);
    }

    #[test]
    fn test_bad_reload_keeps_old_policies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POLICIES.as_bytes()).unwrap();
        let (gate, _) = setup();
        let gate = gate.with_source(Arc::new(TomlPolicySource::new(file.path())));
        gate.reload().unwrap();

        std::fs::write(file.path(), "[[policy]]\nid = 0\nname = \"x\"\nallow = [\"fly\"]\n")
            .unwrap();
        assert_eq!(gate.reload(), Err(Error::InvalidParameter));
        assert_eq!(gate.policy_count().unwrap(), 2);
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn test_checks_during_reloads() {
        let (gate, _) = setup();
        let gate = Arc::new(gate);
        gate.install(vec![SecurityPolicy::enforcing(0, "ro", Rule::AllowList(Rights::READ))])
            .unwrap();

        let readers: Vec<_> = (0..4u32)
            .map(|principal| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    let ctx = gate.new_context(principal, "reader");
                    for _ in 0..200 {
                        let outcome = gate.check_policy(&ctx, 0, Rights::READ);
                        assert!(matches!(outcome, Ok(()) | Err(Error::Busy)));
                    }
                })
            })
            .collect();
        for i in 0..50u8 {
            let policy = SecurityPolicy::enforcing(0, "ro", Rule::AllowList(Rights::READ)).with_priority(i);
            gate.install(vec![policy]).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(gate.generation(), 51);
    }
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Limit(u32, u32),
        Narrow(u32),
        Reenter(u32),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u32..4, 0u32..64).prop_map(|(h, r)| Step::Limit(h, r)),
            (0u32..64).prop_map(Step::Narrow),
            (0u32..64).prop_map(Step::Reenter),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ceiling_never_widens(
            initial in 0u32..64,
            steps in proptest::collection::vec(step(), 0..32),
        ) {
            let (gate, _) = setup();
            let ceiling = Rights::from_bits(initial).unwrap();
            let mut ctx = gate.new_context(1, "prop");
            gate.enter_restricted(&mut ctx, ceiling).unwrap();

            for step in steps {
                match step {
                    Step::Limit(handle, bits) => {
                        let rights = Rights::from_bits(bits).unwrap();
                        if gate.limit_resource(&mut ctx, handle, rights).is_ok() {
                            prop_assert!(rights.is_subset_of(ceiling));
                        }
                    }
                    Step::Narrow(bits) => {
                        ctx.narrow(Rights::from_bits(bits).unwrap()).unwrap();
                    }
                    Step::Reenter(bits) => {
                        let again = gate.enter_restricted(&mut ctx, Rights::from_bits(bits).unwrap());
                        prop_assert_eq!(again, Err(Error::InvalidParameter));
                    }
                }
                let mode = ctx.query_mode();
                prop_assert!(mode.is_restricted());
                prop_assert!(mode.ceiling.is_subset_of(ceiling));
                for handle in 0..4 {
                    prop_assert!(ctx.effective(handle).is_subset_of(ceiling));
                }
            }
        }
    }
}
