// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hardware collaborators a core is built on
//!
//! A [`Platform`] bundles the trait objects each component talks to. Real
//! deployments fill it with device drivers; [`Platform::simulated`] wires up
//! the software models from `q_hal::sim`.

use std::sync::Arc;

use q_audit::LogSink;
use q_common::time::MonotonicClock;
use q_common::Clock;
use q_crypto::{sha3_512, Ed25519Provider, SecureBuffer, SigningProvider};
use q_gate::PolicySource;
use q_hal::caps::StaticCapabilities;
use q_hal::sim::{SimMmu, SimRootOfTrust};
use q_hal::{HardwareCapabilities, MmuControl, ProtectionFeature, ProtectionFeatures, RootOfTrust};

/// Collaborators for one [`SecurityCore`](crate::SecurityCore)
pub struct Platform {
    /// Measurement device
    pub rot: Arc<dyn RootOfTrust>,
    /// Page-table control
    pub mmu: Arc<dyn MmuControl>,
    /// Optional protection features
    pub caps: Arc<dyn HardwareCapabilities>,
    /// Signs measurements and reports
    pub signer: Arc<dyn SigningProvider>,
    /// Ledger MAC key
    pub audit_key: SecureBuffer<32>,
    /// Time source shared by every component
    pub clock: Arc<dyn Clock>,
    /// Persistent audit sink
    pub sink: Option<Arc<dyn LogSink>>,
    /// Where policies are loaded from
    pub policies: Option<Arc<dyn PolicySource>>,
}

impl Platform {
    /// Software platform derived from `seed`
    ///
    /// The signing seed and the ledger key are the two halves of
    /// `SHA3-512(seed)`, so the same seed always yields the same identity.
    #[must_use]
    pub fn simulated(seed: [u8; 32]) -> Self {
        let derived = sha3_512(&seed);
        let (signing_half, mac_half) = derived.as_bytes().split_at(32);
        let mut signing_seed = [0u8; 32];
        signing_seed.copy_from_slice(signing_half);
        let mut audit_key = [0u8; 32];
        audit_key.copy_from_slice(mac_half);

        let features = [ProtectionFeature::Nx, ProtectionFeature::Smep, ProtectionFeature::Smap]
            .into_iter()
            .collect::<ProtectionFeatures>();

        Self {
            rot: Arc::new(SimRootOfTrust::new(seed)),
            mmu: Arc::new(SimMmu::new()),
            caps: Arc::new(StaticCapabilities::new(features)),
            signer: Arc::new(Ed25519Provider::from_seed(&SecureBuffer::from_array(signing_seed))),
            audit_key: SecureBuffer::from_array(audit_key),
            clock: Arc::new(MonotonicClock::new()),
            sink: None,
            policies: None,
        }
    }

    /// Attach a persistent audit sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a policy source
    #[must_use]
    pub fn with_policy_source(mut self, source: Arc<dyn PolicySource>) -> Self {
        self.policies = Some(source);
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl core::fmt::Debug for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Platform")
            .field("algorithm", &self.signer.algorithm())
            .field("has_sink", &self.sink.is_some())
            .field("has_policies", &self.policies.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_is_deterministic() {
        let a = Platform::simulated([3; 32]);
        let b = Platform::simulated([3; 32]);
        let c = Platform::simulated([4; 32]);
        assert_eq!(a.audit_key.as_slice(), b.audit_key.as_slice());
        assert_ne!(a.audit_key.as_slice(), c.audit_key.as_slice());

        let sig_a = a.signer.sign(b"probe").unwrap();
        assert!(b.signer.verify(b"probe", &sig_a).unwrap());
        assert!(!c.signer.verify(b"probe", &sig_a).unwrap());
    }

    #[test]
    fn test_simulated_features() {
        let platform = Platform::simulated([0; 32]);
        let present = platform.caps.probe();
        assert!(present.contains(ProtectionFeature::Nx));
        assert!(!present.contains(ProtectionFeature::Cet));
        assert!(format!("{platform:?}").contains("has_sink: false"));
    }
}
