// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Cryptographic error types
//!
//! This module defines error types for all cryptographic operations.

/// Error type for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Invalid key format or size
    #[error("invalid key")]
    InvalidKey,
    /// Signature has the wrong length or encoding
    #[error("malformed signature")]
    MalformedSignature,
    /// Signature verification failed
    #[error("invalid signature")]
    InvalidSignature,
    /// Provider cannot sign (verification-only or device failure)
    #[error("signing operation failed")]
    SigningFailed,
    /// Buffer is too small for the operation
    #[error("buffer too small")]
    BufferTooSmall,
}

impl CryptoError {
    /// Get error code for logging/debugging
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidKey => 0x1101,
            Self::MalformedSignature => 0x1102,
            Self::InvalidSignature => 0x1103,
            Self::SigningFailed => 0x1104,
            Self::BufferTooSmall => 0x1105,
        }
    }
}

impl From<CryptoError> for q_common::Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidSignature => Self::IntegrityViolation,
            CryptoError::SigningFailed => Self::Unavailable,
            CryptoError::InvalidKey
            | CryptoError::MalformedSignature
            | CryptoError::BufferTooSmall => Self::InvalidParameter,
        }
    }
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
