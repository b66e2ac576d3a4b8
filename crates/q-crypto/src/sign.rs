// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Ed25519 signing provider
//!
//! An in-memory [`SigningProvider`] for hosts without a signing device, and a
//! verification-only variant holding just the public key.

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

use crate::error::{CryptoError, CryptoResult};
use crate::traits::{SignatureAlgorithm, SignatureBytes, SigningProvider, SIGNATURE_SIZE};
use crate::zeroize_utils::SecureBuffer;

/// Ed25519 provider holding a signing key
pub struct Ed25519Provider {
    signing_key: SigningKey,
}

impl Ed25519Provider {
    /// Create a provider from a 32-byte seed
    #[must_use]
    pub fn from_seed(seed: &SecureBuffer<32>) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed.as_array()),
        }
    }

    /// Public half of the key
    #[must_use]
    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl core::fmt::Debug for Ed25519Provider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ed25519Provider").finish_non_exhaustive()
    }
}

impl SigningProvider for Ed25519Provider {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn sign(&self, data: &[u8]) -> CryptoResult<SignatureBytes> {
        Ok(self.signing_key.sign(data).to_bytes())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        verify_with(&self.signing_key.verifying_key(), data, signature)
    }
}

/// Verification-only Ed25519 provider
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    verifying_key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Create from a 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the bytes are not a valid point.
    pub fn from_public_key(bytes: &[u8; 32]) -> CryptoResult<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { verifying_key })
    }
}

impl SigningProvider for Ed25519Verifier {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn sign(&self, _data: &[u8]) -> CryptoResult<SignatureBytes> {
        Err(CryptoError::SigningFailed)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        verify_with(&self.verifying_key, data, signature)
    }
}

fn verify_with(key: &VerifyingKey, data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
    let bytes: &[u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| CryptoError::MalformedSignature)?;
    let signature = Signature::from_bytes(bytes);
    Ok(key.verify_strict(data, &signature).is_ok())
}
