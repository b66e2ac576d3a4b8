// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for Qbitel TrustCore
//!
//! This module defines the unified error taxonomy shared by the trust anchor,
//! the protection table, the capability gate and the audit ledger. Every
//! variant is `Copy` so errors can be recorded into the audit ledger and
//! returned to the caller without allocation.

/// Result type alias for Qbitel TrustCore operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for Qbitel TrustCore
///
/// The taxonomy is deliberately small. Callers branch on the variant, never on
/// the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Caller Errors (0x01xx)
    // =========================================================================
    /// Caller supplied an invalid argument; no state was changed
    #[error("invalid parameter")]
    InvalidParameter,

    // =========================================================================
    // Security Decisions (0x02xx)
    // =========================================================================
    /// Authorization denied; always audited
    #[error("permission denied")]
    Permission,
    /// Measurement or signature mismatch; fatal to the operation
    #[error("integrity violation")]
    IntegrityViolation,

    // =========================================================================
    // Resource Errors (0x03xx)
    // =========================================================================
    /// Table or ledger is full; caller must back off
    #[error("resource exhausted")]
    ResourceExhausted,
    /// Lock or hardware timeout; safe to retry
    #[error("resource busy")]
    Busy,

    // =========================================================================
    // Hardware Errors (0x04xx)
    // =========================================================================
    /// Hardware or collaborator missing or below minimum capability
    #[error("unavailable")]
    Unavailable,
    /// Root of trust timed out after bounded retries; measurement not recorded
    #[error("integrity hardware unavailable")]
    IntegrityUnavailable,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Caller errors
    /// - 0x02xx: Security decisions
    /// - 0x03xx: Resource errors
    /// - 0x04xx: Hardware errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidParameter => 0x0101,
            Self::Permission => 0x0201,
            Self::IntegrityViolation => 0x0202,
            Self::ResourceExhausted => 0x0301,
            Self::Busy => 0x0302,
            Self::Unavailable => 0x0401,
            Self::IntegrityUnavailable => 0x0402,
        }
    }

    /// Check if this is a security decision that must always be audited
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(self, Self::Permission | Self::IntegrityViolation)
    }

    /// Check if the operation may succeed when retried unchanged
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::IntegrityUnavailable)
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "caller error, no state change",
            Self::Permission => "authorization denied",
            Self::IntegrityViolation => "measurement or signature mismatch",
            Self::ResourceExhausted => "table or ledger full",
            Self::Busy => "lock or hardware timeout",
            Self::Unavailable => "hardware or collaborator missing",
            Self::IntegrityUnavailable => "root of trust timed out",
        }
    }

    /// Process exit code for this error when it escapes to the boot flow
    ///
    /// `IntegrityViolation` and `Unavailable` require recovery mode (2);
    /// everything else is degraded but recoverable (1).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::IntegrityViolation | Self::Unavailable => ExitCode::FATAL,
            _ => ExitCode::DEGRADED,
        }
    }
}

/// Process exit codes mirroring the boot flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode;

impl ExitCode {
    /// Healthy
    pub const HEALTHY: i32 = 0;
    /// Degraded but recoverable
    pub const DEGRADED: i32 = 1;
    /// Fatal; caller must enter recovery mode
    pub const FATAL: i32 = 2;
}
