// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL error types

/// HAL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    /// Device absent or not responding to probe
    #[error("device not present")]
    NotPresent,
    /// Bus transaction timed out; may be retried
    #[error("operation timeout")]
    Timeout,
    /// Hardware busy with another transaction
    #[error("hardware busy")]
    Busy,
    /// Hardware fault detected
    #[error("hardware fault detected")]
    HardwareFault,
    /// Register or feature index out of range
    #[error("index out of range")]
    InvalidIndex,
    /// Address range rejected by the device
    #[error("invalid address range")]
    InvalidRange,
    /// Operation not supported on this platform
    #[error("not supported")]
    NotSupported,
}

impl HalError {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::NotPresent => 0x0801,
            Self::Timeout => 0x0802,
            Self::Busy => 0x0803,
            Self::HardwareFault => 0x0804,
            Self::InvalidIndex => 0x0805,
            Self::InvalidRange => 0x0806,
            Self::NotSupported => 0x08FF,
        }
    }

    /// Whether a bounded retry is appropriate
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Busy)
    }
}

impl From<HalError> for q_common::Error {
    fn from(e: HalError) -> Self {
        match e {
            HalError::Timeout | HalError::Busy => Self::Busy,
            HalError::NotPresent | HalError::HardwareFault | HalError::NotSupported => {
                Self::Unavailable
            }
            HalError::InvalidIndex | HalError::InvalidRange => Self::InvalidParameter,
        }
    }
}

/// HAL Result type
pub type HalResult<T> = Result<T, HalError>;
