// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! The owning security core
//!
//! # Init Flow
//!
//! ```text
//! validate config
//!   -> audit ledger (every later step records into it)
//!   -> trust anchor init
//!   -> protection table init
//!   -> default regions
//!   -> capability gate + policy load
//!   -> CoreStarted
//! ```
//!
//! Any failing step aborts init and drops what was built so far. Use
//! [`boot_outcome`](crate::boot_outcome) to classify the error.

use std::sync::Arc;

use q_attest::TrustAnchor;
use q_audit::{AuditClass, AuditEvent, AuditLedger, EventCode, LedgerStats, Severity};
use q_common::{CoreConfig, Error, Result};
use q_gate::CapabilityGate;
use q_protect::{ProtectionStats, ProtectionTable, RegionSpec};

use crate::platform::Platform;
use crate::status::CoreStatus;

/// Final counters returned by [`SecurityCore::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ShutdownReport {
    /// Records handed to the sink by the final flush
    pub flushed: usize,
    /// Regions released by the table reset
    pub released_regions: usize,
    /// Ledger counters after the flush
    pub ledger: LedgerStats,
    /// Table counters after the reset
    pub protection: ProtectionStats,
}

/// One fully wired security core
///
/// Instances share nothing, so several may run side by side.
pub struct SecurityCore {
    config: CoreConfig,
    ledger: Arc<AuditLedger>,
    anchor: Arc<TrustAnchor>,
    table: Arc<ProtectionTable>,
    gate: Arc<CapabilityGate>,
}

fn step_failed(step: &'static str) -> impl Fn(Error) -> Error {
    move |e| {
        tracing::error!(step, error = %e, "security core init failed");
        e
    }
}

impl SecurityCore {
    /// Build and initialize every component
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an inconsistent configuration or a
    ///   malformed default region
    /// - [`Error::Unavailable`] if the root of trust is absent or faulty, or
    ///   the policy source cannot be read
    /// - Any error from protecting a default region or loading policies
    #[tracing::instrument(skip_all)]
    pub fn init(config: CoreConfig, platform: Platform) -> Result<Self> {
        config.validate().map_err(|e| {
            tracing::error!(error = %e, "rejected configuration");
            Error::from(e)
        })?;
        let timeout = config.lock_timeout();

        let mut ledger = AuditLedger::new(&config.audit, &platform.audit_key, platform.clock.clone())
            .map_err(step_failed("ledger"))?
            .with_lock_timeout(timeout);
        if let Some(sink) = platform.sink {
            ledger = ledger.with_sink(sink);
        }
        let ledger = Arc::new(ledger);

        let anchor = TrustAnchor::new(
            config.attest,
            platform.rot,
            platform.signer,
            ledger.clone(),
            platform.clock.clone(),
        )
        .with_lock_timeout(timeout);
        anchor.init().map_err(step_failed("anchor"))?;

        let table = ProtectionTable::new(
            &config.protect,
            platform.mmu,
            platform.caps,
            ledger.clone(),
            platform.clock,
        )
        .map_err(step_failed("protection"))?
        .with_lock_timeout(timeout);
        let features = table.init().map_err(step_failed("protection"))?;

        for region in &config.protect.default_regions {
            let (spec, flags) = RegionSpec::from_config(region).map_err(step_failed("regions"))?;
            table.protect(spec, flags).map_err(step_failed("regions"))?;
        }

        let mut gate = CapabilityGate::new(&config.gate, ledger.clone())
            .map_err(step_failed("gate"))?
            .with_lock_timeout(timeout);
        let policies = match platform.policies {
            Some(source) => {
                gate = gate.with_source(source);
                gate.reload().map_err(step_failed("policies"))?
            }
            None => 0,
        };

        let event = AuditEvent::new(AuditClass::System, Severity::Notice, EventCode::CoreStarted)
            .with_payload(features.bits().to_le_bytes());
        if let Err(e) = ledger.append(event) {
            tracing::warn!(error = %e, "failed to record core start");
        }
        tracing::info!(
            regions = config.protect.default_regions.len(),
            policies,
            features = features.bits(),
            "security core started"
        );

        Ok(Self {
            config,
            ledger,
            anchor: Arc::new(anchor),
            table: Arc::new(table),
            gate: Arc::new(gate),
        })
    }

    /// Configuration the core was built with
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Audit ledger
    #[must_use]
    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    /// Trust anchor
    #[must_use]
    pub fn anchor(&self) -> &Arc<TrustAnchor> {
        &self.anchor
    }

    /// Protection table
    #[must_use]
    pub fn table(&self) -> &Arc<ProtectionTable> {
        &self.table
    }

    /// Capability gate
    #[must_use]
    pub fn gate(&self) -> &Arc<CapabilityGate> {
        &self.gate
    }

    /// Current status and health
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the policy registry lock times out.
    pub fn status(&self) -> Result<CoreStatus> {
        Ok(CoreStatus::collect(
            self.anchor.state(),
            &self.table.stats(),
            &self.ledger.stats(),
            self.gate.policy_count()?,
        ))
    }

    /// Swap the policy registry from the platform's policy source
    ///
    /// Returns the number of policies now installed. A failed reload keeps
    /// the previous registry.
    ///
    /// # Errors
    ///
    /// - [`Error::Unavailable`] if the platform has no policy source or it
    ///   cannot be read
    /// - [`Error::InvalidParameter`] if the policies are malformed
    pub fn reload_policies(&self) -> Result<usize> {
        self.gate.reload()
    }

    /// Reset protection, record the shutdown and flush the ledger
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if a component lock times out
    /// - [`Error::Unavailable`] if the sink rejects the final flush
    #[tracing::instrument(skip(self))]
    pub fn shutdown(self) -> Result<ShutdownReport> {
        let released_regions = self.table.reset()?;

        let event = AuditEvent::new(AuditClass::System, Severity::Notice, EventCode::CoreShutdown)
            .with_payload(u32::try_from(released_regions).unwrap_or(u32::MAX).to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record core shutdown");
        }

        let flushed = if self.ledger.has_sink() {
            self.ledger.flush()?
        } else {
            0
        };

        let report = ShutdownReport {
            flushed,
            released_regions,
            ledger: self.ledger.stats(),
            protection: self.table.stats(),
        };
        tracing::info!(flushed, released_regions, "security core stopped");
        Ok(report)
    }
}

impl core::fmt::Debug for SecurityCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecurityCore")
            .field("trust_state", &self.anchor.state())
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
