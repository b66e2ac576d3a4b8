// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Capability gate
//!
//! A request is authorized only when the context's capabilities and the
//! administered policy both allow it. Either one denying is enough.
//!
//! The policy registry is read far more often than it is replaced, so it
//! sits behind a readers-writer lock. A reload validates the new set in full
//! before swapping it in; a bad set leaves the old registry in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use q_audit::{audit_error, AuditClass, AuditEvent, AuditLedger, EventCode, Severity};
use q_common::config::{GateConfig, MAX_POLICIES};
use q_common::{CoreConfig, Error, Result};

use crate::context::ExecutionContext;
use crate::policy::{PolicyFlags, PolicySource, SecurityPolicy};
use crate::rights::Rights;

struct Registry {
    slots: Vec<Option<SecurityPolicy>>,
    generation: u64,
}

impl Registry {
    fn build(max_policies: u32, policies: Vec<SecurityPolicy>, generation: u64) -> Result<Self> {
        let mut slots = vec![None; max_policies as usize];
        for policy in policies {
            let slot = slots
                .get_mut(policy.id as usize)
                .ok_or(Error::InvalidParameter)?;
            if slot.is_some() {
                tracing::warn!(id = policy.id, "duplicate policy id");
                return Err(Error::InvalidParameter);
            }
            *slot = Some(policy);
        }
        Ok(Self { slots, generation })
    }

    fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

/// Policy and capability checks for execution contexts
pub struct CapabilityGate {
    max_policies: u32,
    lock_timeout: Duration,
    ledger: Arc<AuditLedger>,
    source: Option<Arc<dyn PolicySource>>,
    registry: RwLock<Registry>,
    next_correlation: AtomicU64,
}

impl CapabilityGate {
    /// Create a gate with an empty registry
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `max_policies` is zero or
    /// above [`MAX_POLICIES`].
    pub fn new(config: &GateConfig, ledger: Arc<AuditLedger>) -> Result<Self> {
        if config.max_policies == 0 || config.max_policies > MAX_POLICIES {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            max_policies: config.max_policies,
            lock_timeout: CoreConfig::DEFAULT.lock_timeout(),
            ledger,
            source: None,
            registry: RwLock::new(Registry {
                slots: vec![None; config.max_policies as usize],
                generation: 0,
            }),
            next_correlation: AtomicU64::new(1),
        })
    }

    /// Attach the source [`reload`](Self::reload) reads
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn PolicySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Bound every internal lock acquisition by `timeout`
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Create an ambient context with a fresh correlation id
    pub fn new_context(&self, principal: u32, label: impl Into<String>) -> ExecutionContext {
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        ExecutionContext::new(principal, label, correlation)
    }

    /// Replace the whole registry
    ///
    /// Returns the number of policies installed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an out-of-range or duplicate id; the
    ///   registry is unchanged
    /// - [`Error::Busy`] if the write lock times out
    pub fn install(&self, policies: Vec<SecurityPolicy>) -> Result<usize> {
        let mut registry = self
            .registry
            .try_write_for(self.lock_timeout)
            .ok_or(Error::Busy)?;
        let next = Registry::build(self.max_policies, policies, registry.generation + 1)?;
        let count = next.len();
        *registry = next;
        tracing::debug!(count, generation = registry.generation, "policy registry replaced");
        Ok(count)
    }

    /// Reload the registry from the attached source and record the reload
    ///
    /// # Errors
    ///
    /// - [`Error::Unavailable`] if no source is attached or it cannot be read
    /// - Any error from the source or [`install`](Self::install)
    #[tracing::instrument(skip(self))]
    pub fn reload(&self) -> Result<usize> {
        let source = self.source.as_ref().ok_or(Error::Unavailable)?;
        let count = source
            .load()
            .and_then(|policies| self.install(policies))
            .map_err(|e| {
                tracing::warn!(error = %e, "policy reload failed");
                audit_error(&self.ledger, e, AuditClass::System, EventCode::PoliciesReloaded, 0)
            })?;
        let event = AuditEvent::new(AuditClass::System, Severity::Notice, EventCode::PoliciesReloaded)
            .with_correlation(self.generation())
            .with_payload(u32::try_from(count).unwrap_or(u32::MAX).to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record policy reload");
        }
        tracing::info!(count, "policies reloaded");
        Ok(count)
    }

    /// Registry generation, bumped by every successful install
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.registry
            .try_read_for(self.lock_timeout)
            .map_or(0, |r| r.generation)
    }

    /// Number of installed policies
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the read lock times out.
    pub fn policy_count(&self) -> Result<usize> {
        let registry = self.registry.try_read_for(self.lock_timeout).ok_or(Error::Busy)?;
        Ok(registry.len())
    }

    /// Installed policies, highest priority first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the read lock times out.
    pub fn policies(&self) -> Result<Vec<SecurityPolicy>> {
        let registry = self.registry.try_read_for(self.lock_timeout).ok_or(Error::Busy)?;
        let mut list: Vec<SecurityPolicy> = registry.slots.iter().flatten().cloned().collect();
        list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    /// Enter restricted mode with `rights` as the ceiling
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the context is already
    /// restricted.
    pub fn enter_restricted(&self, ctx: &mut ExecutionContext, rights: Rights) -> Result<()> {
        ctx.enter_restricted(rights)?;
        let event = AuditEvent::new(AuditClass::Process, Severity::Info, EventCode::ContextRestricted)
            .with_correlation(ctx.correlation())
            .with_payload(rights.bits().to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record restriction");
        }
        tracing::debug!(principal = ctx.principal(), %rights, "context restricted");
        Ok(())
    }

    /// Limit `handle` to `rights`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the context is not restricted
    /// - [`Error::Permission`] if `rights` exceed the ceiling or the handle's
    ///   existing limit; audited
    /// - [`Error::ResourceExhausted`] if the context's handle table is full
    pub fn limit_resource(&self, ctx: &mut ExecutionContext, handle: u32, rights: Rights) -> Result<()> {
        match ctx.limit_resource(handle, rights) {
            Ok(()) => {
                let mut payload = handle.to_le_bytes().to_vec();
                payload.extend_from_slice(&rights.bits().to_le_bytes());
                let event = AuditEvent::new(AuditClass::Process, Severity::Debug, EventCode::ResourceLimited)
                    .with_correlation(ctx.correlation())
                    .with_payload(payload);
                if let Err(e) = self.ledger.append(event) {
                    tracing::warn!(error = %e, "failed to record resource limit");
                }
                Ok(())
            }
            Err(Error::Permission) => {
                tracing::warn!(principal = ctx.principal(), handle, %rights, "limit would widen rights");
                Err(audit_error(
                    &self.ledger,
                    Error::Permission,
                    AuditClass::Security,
                    EventCode::LimitDenied,
                    ctx.correlation(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Check `access` against policy `policy_id`
    ///
    /// Writes exactly one Security-class record, grant or deny, tagged with
    /// the context's correlation id.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an out-of-range or unknown id
    /// - [`Error::Permission`] if the policy is disabled, not enforcing or
    ///   its rule denies `access`
    /// - [`Error::Busy`] if the read lock times out
    pub fn check_policy(&self, ctx: &ExecutionContext, policy_id: u32, access: Rights) -> Result<()> {
        let verdict = {
            let registry = self.registry.try_read_for(self.lock_timeout).ok_or(Error::Busy)?;
            match registry.slots.get(policy_id as usize).and_then(Option::as_ref) {
                None => Err((Error::InvalidParameter, EventCode::PolicyInvalid)),
                Some(p) if !p.flags.contains(PolicyFlags::ENABLED) => {
                    Err((Error::Permission, EventCode::PolicyInvalid))
                }
                Some(p) if !p.flags.contains(PolicyFlags::ENFORCING) => {
                    Err((Error::Permission, EventCode::PolicyNotEnforcing))
                }
                Some(p) if !p.rule.permits(ctx, access) => Err((Error::Permission, EventCode::PolicyDenied)),
                Some(_) => Ok(()),
            }
        };

        let mut payload = policy_id.to_le_bytes().to_vec();
        payload.extend_from_slice(&access.bits().to_le_bytes());
        match verdict {
            Ok(()) => {
                let event = AuditEvent::new(AuditClass::Security, Severity::Info, EventCode::PolicyGranted)
                    .with_correlation(ctx.correlation())
                    .with_payload(payload);
                self.ledger.append_unfiltered(event)?;
                Ok(())
            }
            Err((Error::Permission, code)) => {
                tracing::warn!(policy_id, %access, ?code, "policy denied request");
                Err(audit_error(&self.ledger, Error::Permission, AuditClass::Security, code, ctx.correlation()))
            }
            Err((err, code)) => {
                tracing::warn!(policy_id, "unknown policy");
                let event = AuditEvent::new(AuditClass::Security, Severity::Warning, code)
                    .with_correlation(ctx.correlation())
                    .with_payload(payload);
                if let Err(e) = self.ledger.append_unfiltered(event) {
                    tracing::error!(error = %e, "failed to record invalid policy check");
                }
                Err(err)
            }
        }
    }

    /// Authorize `access` on `handle` under policy `policy_id`
    ///
    /// The capability check runs first; a capability denial is audited and
    /// the policy is not consulted.
    ///
    /// # Errors
    ///
    /// - [`Error::Permission`] if either check denies
    /// - Any error from [`check_policy`](Self::check_policy)
    pub fn authorize(
        &self,
        ctx: &ExecutionContext,
        handle: u32,
        policy_id: u32,
        access: Rights,
    ) -> Result<()> {
        if !access.is_subset_of(ctx.effective(handle)) {
            tracing::warn!(principal = ctx.principal(), handle, %access, "capability denied");
            return Err(audit_error(
                &self.ledger,
                Error::Permission,
                AuditClass::Security,
                EventCode::CapabilityDenied,
                ctx.correlation(),
            ));
        }
        self.check_policy(ctx, policy_id, access)
    }
}

impl core::fmt::Debug for CapabilityGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("max_policies", &self.max_policies)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Rule, StaticPolicySource};
    use q_common::config::AuditConfig;
    use q_common::time::ManualClock;
    use q_crypto::SecureBuffer;

    fn gate() -> (CapabilityGate, Arc<AuditLedger>) {
        let ledger = Arc::new(
            AuditLedger::new(
                &AuditConfig::DEFAULT,
                &SecureBuffer::from_array([5; 32]),
                Arc::new(ManualClock::new(0)),
            )
            .unwrap(),
        );
        (CapabilityGate::new(&GateConfig::DEFAULT, ledger.clone()).unwrap(), ledger)
    }

    #[test]
    fn test_install_rejects_duplicates_atomically() {
        let (gate, _) = gate();
        gate.install(vec![SecurityPolicy::enforcing(1, "a", Rule::AllowList(Rights::READ))])
            .unwrap();
        let dup = vec![
            SecurityPolicy::enforcing(2, "b", Rule::AllowList(Rights::READ)),
            SecurityPolicy::enforcing(2, "c", Rule::AllowList(Rights::READ)),
        ];
        assert_eq!(gate.install(dup), Err(Error::InvalidParameter));
        assert_eq!(gate.policy_count().unwrap(), 1);
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn test_policies_sorted_by_priority() {
        let (gate, _) = gate();
        gate.install(vec![
            SecurityPolicy::enforcing(3, "low", Rule::AllowList(Rights::READ)),
            SecurityPolicy::enforcing(4, "high", Rule::AllowList(Rights::READ)).with_priority(9),
        ])
        .unwrap();
        let names: Vec<String> = gate.policies().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_reload_without_source() {
        let (gate, _) = gate();
        assert_eq!(gate.reload(), Err(Error::Unavailable));
    }

    #[test]
    fn test_reload_from_source() {
        let (gate, ledger) = gate();
        let gate = gate.with_source(Arc::new(StaticPolicySource(vec![SecurityPolicy::enforcing(
            0,
            "all",
            Rule::DenyList(Rights::NONE),
        )])));
        assert_eq!(gate.reload().unwrap(), 1);
        let last = ledger.records().unwrap().into_iter().last().unwrap();
        assert_eq!(last.code, EventCode::PoliciesReloaded);
    }

    #[test]
    fn test_check_order() {
        let (gate, _) = gate();
        gate.install(vec![
            SecurityPolicy::enforcing(1, "off", Rule::AllowList(Rights::ALL))
                .with_flags(PolicyFlags::ENFORCING),
            SecurityPolicy::enforcing(2, "ro", Rule::AllowList(Rights::READ)),
        ])
        .unwrap();
        let ctx = gate.new_context(1, "svc");
        assert_eq!(gate.check_policy(&ctx, MAX_POLICIES, Rights::READ), Err(Error::InvalidParameter));
        assert_eq!(gate.check_policy(&ctx, 5, Rights::READ), Err(Error::InvalidParameter));
        assert_eq!(gate.check_policy(&ctx, 1, Rights::READ), Err(Error::Permission));
        assert_eq!(gate.check_policy(&ctx, 2, Rights::WRITE), Err(Error::Permission));
        assert_eq!(gate.check_policy(&ctx, 2, Rights::READ), Ok(()));
    }

    #[test]
    fn test_contexts_get_distinct_correlations() {
        let (gate, _) = gate();
        let a = gate.new_context(1, "a");
        let b = gate.new_context(1, "b");
        assert_ne!(a.correlation(), b.correlation());
    }
}
