// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Health reporting

use core::fmt;

use q_attest::AnchorState;
use q_audit::LedgerStats;
use q_common::{Error, ExitCode};
use q_protect::ProtectionStats;
use serde::Serialize;

/// Overall core health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// Everything nominal
    Healthy,
    /// Operating, but audit data was lost or trust is not established
    Degraded,
    /// Trust anchor has failed
    Fatal,
}

impl Health {
    /// Classify from component state
    #[must_use]
    pub fn assess(trust_state: AnchorState, ledger: &LedgerStats) -> Self {
        match trust_state {
            AnchorState::Error => Self::Fatal,
            AnchorState::Ready | AnchorState::Sealed
                if ledger.dropped_total() == 0 && ledger.lost_unflushed == 0 =>
            {
                Self::Healthy
            }
            _ => Self::Degraded,
        }
    }

    /// Process exit code
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Healthy => ExitCode::HEALTHY,
            Self::Degraded => ExitCode::DEGRADED,
            Self::Fatal => ExitCode::FATAL,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Fatal => "fatal",
        })
    }
}

/// Point-in-time summary of a core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreStatus {
    /// Trust anchor lifecycle state
    pub trust_state: AnchorState,
    /// Protected regions in the table
    pub active_regions: usize,
    /// Main ledger ring fill, 0..=100
    pub ledger_fill: u8,
    /// Main ledger ring capacity
    pub ledger_capacity: u64,
    /// Records dropped by the ingest filter
    pub dropped_total: u64,
    /// Records evicted before reaching the sink
    pub lost_unflushed: u64,
    /// Installed security policies
    pub policies: usize,
    /// Overall health
    pub health: Health,
}

impl CoreStatus {
    pub(crate) fn collect(
        trust_state: AnchorState,
        protection: &ProtectionStats,
        ledger: &LedgerStats,
        policies: usize,
    ) -> Self {
        Self {
            trust_state,
            active_regions: protection.active_regions,
            ledger_fill: ledger.fill_percent(),
            ledger_capacity: ledger.capacity,
            dropped_total: ledger.dropped_total(),
            lost_unflushed: ledger.lost_unflushed,
            policies,
            health: Health::assess(trust_state, ledger),
        }
    }
}

impl fmt::Display for CoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "health:         {}", self.health)?;
        writeln!(f, "trust state:    {}", self.trust_state.name())?;
        writeln!(f, "regions:        {}", self.active_regions)?;
        writeln!(f, "ledger:         {}% of {}", self.ledger_fill, self.ledger_capacity)?;
        writeln!(f, "dropped:        {}", self.dropped_total)?;
        writeln!(f, "lost unflushed: {}", self.lost_unflushed)?;
        write!(f, "policies:       {}", self.policies)
    }
}

/// How a boot attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Core came up
    Healthy,
    /// Core failed, retry is reasonable
    Degraded(Error),
    /// Trust or hardware failure; operator recovery needed
    RecoveryRequired(Error),
}

impl BootOutcome {
    /// Exit code for this outcome
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Healthy => ExitCode::HEALTHY,
            Self::Degraded(_) => ExitCode::DEGRADED,
            Self::RecoveryRequired(_) => ExitCode::FATAL,
        }
    }
}

/// Classify the result of a boot or administrative action
#[must_use]
pub fn boot_outcome<T>(result: &Result<T, Error>) -> BootOutcome {
    match result {
        Ok(_) => BootOutcome::Healthy,
        Err(e @ (Error::IntegrityViolation | Error::Unavailable)) => BootOutcome::RecoveryRequired(*e),
        Err(e) => BootOutcome::Degraded(*e),
    }
}
