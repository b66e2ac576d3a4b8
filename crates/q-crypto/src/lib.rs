// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel TrustCore Cryptographic Layer
//!
//! This crate provides the primitives the trust core is built on:
//!
//! - **Hashing**: SHA3-512 measurement digests and register accumulation,
//!   SHA3-256 payload hashes
//! - **Comparison**: constant-time equality for digests and tags
//! - **Signing**: the [`SigningProvider`] collaborator contract and an
//!   Ed25519 implementation
//! - **Record MAC**: HMAC-SHA3-256 over audit record headers
//!
//! # Security Requirements
//!
//! All cryptographic operations in this crate:
//! - Compare secrets in constant time (no early exit)
//! - Zeroize key material on drop
//! - Never log or expose key material

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod hash;
pub mod mac;
pub mod sign;
pub mod traits;
pub mod zeroize_utils;

pub use error::{CryptoError, CryptoResult};
pub use hash::{sha3_256, sha3_512, Digest256, Digest512, DIGEST_SIZE};
pub use mac::{RecordMac, MAC_SIZE};
pub use sign::{Ed25519Provider, Ed25519Verifier};
pub use traits::{
    constant_time_eq, Hash, SignatureAlgorithm, SignatureBytes, SigningProvider, SIGNATURE_SIZE,
};
pub use zeroize_utils::SecureBuffer;
