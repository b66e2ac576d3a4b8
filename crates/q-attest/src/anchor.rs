// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Trust anchor
//!
//! Owns the measurement log and drives the hardware root of trust.
//!
//! ```text
//!                 init()            probe + entropy ok
//! Uninitialized ---------> Initializing ---------------> Ready ---seal()---> Sealed
//!        |                      |                          |                   |
//!        +----------------------+------- hardware fault ---+-------------------+
//!                                              |
//!                                              v
//!                                            Error ---init()---> Initializing
//! ```
//!
//! Register extension and log append happen together under the log lock,
//! so a concurrent [`TrustAnchor::read_register`] never sees a register that
//! is ahead of the log.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use q_audit::{audit_error, AuditClass, AuditEvent, AuditLedger, EventCode, Severity};
use q_common::config::AttestConfig;
use q_common::time::Backoff;
use q_common::{Clock, CoreConfig, Error, Result};
use q_crypto::{
    constant_time_eq, sha3_512, CryptoError, Digest512, SecureBuffer, SigningProvider,
    SIGNATURE_SIZE,
};
use q_hal::{HalError, RootOfTrust, HASH_SHA3_512};
use serde::{Deserialize, Serialize};

use crate::chain::BootChain;
use crate::evidence::{AttestationReport, NONCE_SIZE, REPORT_VERSION};
use crate::log::MeasurementLog;
use crate::measurement::{Measurement, REGISTER_COUNT};

/// Largest single `get_random` request
pub const MAX_RANDOM_BYTES: usize = 4096;

/// Trust anchor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AnchorState {
    /// Not yet initialized
    Uninitialized = 0,
    /// `init` in progress
    Initializing = 1,
    /// Accepting measurements
    Ready = 2,
    /// Measurements frozen, reads still served
    Sealed = 3,
    /// Hardware failure; only `init` leaves this state
    Error = 4,
}

impl From<u8> for AnchorState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Sealed,
            _ => Self::Error,
        }
    }
}

impl AnchorState {
    /// Human-readable name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Sealed => "sealed",
            Self::Error => "error",
        }
    }
}

struct LogState {
    log: MeasurementLog,
    next_sequence: u64,
}

/// Hardware-anchored measurement accumulator
pub struct TrustAnchor {
    config: AttestConfig,
    lock_timeout: Duration,
    rot: Arc<dyn RootOfTrust>,
    signer: Arc<dyn SigningProvider>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    log: Mutex<LogState>,
}

impl TrustAnchor {
    /// Create an uninitialized anchor
    #[must_use]
    pub fn new(
        config: AttestConfig,
        rot: Arc<dyn RootOfTrust>,
        signer: Arc<dyn SigningProvider>,
        ledger: Arc<AuditLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            lock_timeout: CoreConfig::DEFAULT.lock_timeout(),
            rot,
            signer,
            ledger,
            clock,
            state: AtomicU8::new(AnchorState::Uninitialized as u8),
            log: Mutex::new(LogState {
                log: MeasurementLog::new(),
                next_sequence: 1,
            }),
        }
    }

    /// Bound every internal lock acquisition by `timeout`
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> AnchorState {
        AnchorState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: AnchorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn lock_log(&self) -> Result<MutexGuard<'_, LogState>> {
        self.log.try_lock_for(self.lock_timeout).ok_or(Error::Busy)
    }

    fn fault(&self, cause: HalError) -> Error {
        self.set_state(AnchorState::Error);
        tracing::error!(error = %cause, "root of trust fault, anchor entering error state");
        let event = AuditEvent::new(AuditClass::Hardware, Severity::Critical, EventCode::AnchorFault)
            .with_payload(cause.code().to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::error!(error = %e, "failed to record anchor fault");
        }
        Error::Unavailable
    }

    /// Probe the root of trust and move to `Ready`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if already `Ready` or `Sealed`
    /// - [`Error::Unavailable`] if the device is absent, below minimum
    ///   capability or its entropy source looks stuck
    #[tracing::instrument(skip(self))]
    pub fn init(&self) -> Result<()> {
        let mut guard = self.lock_log()?;
        if matches!(self.state(), AnchorState::Ready | AnchorState::Sealed) {
            return Err(Error::InvalidParameter);
        }
        self.set_state(AnchorState::Initializing);

        let caps = self.rot.probe().map_err(|e| self.fault(e))?;
        let sig_bit = self.signer.algorithm().capability_bit();
        if caps.version < self.config.min_rot_version
            || caps.hash_algorithms & HASH_SHA3_512 == 0
            || caps.signature_algorithms & sig_bit == 0
            || caps.register_count < REGISTER_COUNT
        {
            tracing::error!(version = caps.version, "root of trust below minimum capability");
            return Err(self.fault(HalError::NotSupported));
        }

        if self.config.entropy_check {
            let mut raw = [0u8; 32];
            self.rot.get_random(&mut raw).map_err(|e| self.fault(e))?;
            let sample = SecureBuffer::from_array(raw);
            if sample.is_degenerate() {
                tracing::error!("entropy self-test failed");
                return Err(self.fault(HalError::HardwareFault));
            }
        }

        *guard = LogState {
            log: MeasurementLog::new(),
            next_sequence: 1,
        };
        self.set_state(AnchorState::Ready);
        tracing::info!(version = caps.version, registers = caps.register_count, "trust anchor ready");
        Ok(())
    }

    /// Refuse mutation unless `Ready`; sealed refusals are audited
    fn require_ready(&self, refused: EventCode) -> Result<()> {
        match self.state() {
            AnchorState::Ready => Ok(()),
            AnchorState::Sealed => {
                tracing::warn!(code = ?refused, "anchor sealed, mutation refused");
                Err(audit_error(&self.ledger, Error::Permission, AuditClass::Security, refused, 0))
            }
            _ => Err(Error::Unavailable),
        }
    }

    /// Extend `index` with retry on bus timeout
    fn extend_register(&self, index: u32, digest: &Digest512) -> Result<Digest512> {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.backoff_base_ms),
            self.config.max_retries,
        );
        loop {
            match self.rot.extend(index, digest) {
                Ok(value) => return Ok(value),
                Err(HalError::Timeout | HalError::Busy) => match backoff.next() {
                    Some(delay) => {
                        tracing::debug!(index, attempt = backoff.attempts(), "extend timed out, retrying");
                        std::thread::sleep(delay);
                    }
                    None => {
                        tracing::warn!(index, "extend retries exhausted");
                        return Err(Error::IntegrityUnavailable);
                    }
                },
                Err(e @ (HalError::HardwareFault | HalError::NotPresent)) => {
                    return Err(self.fault(e));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Measure `data` into register `index`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `index` is out of range
    /// - [`Error::Permission`] if the anchor is sealed
    /// - [`Error::ResourceExhausted`] if the log is full
    /// - [`Error::IntegrityUnavailable`] if the device keeps timing out
    /// - [`Error::Unavailable`] on a hardware fault or when not initialized
    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    pub fn extend_measurement(&self, index: u32, data: &[u8]) -> Result<Measurement> {
        if index >= REGISTER_COUNT {
            return Err(Error::InvalidParameter);
        }
        let digest = sha3_512(data);

        let measurement = {
            let mut guard = self.lock_log()?;
            self.require_ready(EventCode::ExtendRefused)?;
            if guard.log.remaining() == 0 {
                return Err(Error::ResourceExhausted);
            }

            let sequence = guard.next_sequence;
            let timestamp = self.clock.now();
            let signed = Measurement::signed_bytes(index, &digest, timestamp, sequence);
            let signature = self.signer.sign(&signed)?;

            self.extend_register(index, &digest)?;
            let measurement = Measurement {
                register: index,
                digest,
                signature,
                timestamp,
                sequence,
            };
            guard.log.push(measurement)?;
            guard.next_sequence += 1;
            measurement
        };

        self.record_extension(&measurement);
        Ok(measurement)
    }

    fn record_extension(&self, measurement: &Measurement) {
        let mut payload = Vec::with_capacity(4 + 64);
        payload.extend_from_slice(&measurement.register.to_le_bytes());
        payload.extend_from_slice(measurement.digest.as_bytes());
        let event = AuditEvent::new(AuditClass::System, Severity::Info, EventCode::MeasurementExtended)
            .with_correlation(measurement.sequence)
            .with_payload(payload);
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record measurement");
        }
    }

    /// Verify a boot chain and, if every link checks out, commit it
    ///
    /// Nothing is extended or logged unless the whole chain verifies. On a
    /// digest or signature mismatch a critical record is written and flushed
    /// before the error is returned. Links are committed to a staged copy of
    /// the log; if the device fails after the first register was extended the
    /// log is left untouched and the anchor faults.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] on a structurally invalid chain
    /// - [`Error::ResourceExhausted`] if the log cannot hold every link
    /// - [`Error::IntegrityViolation`] on any digest or signature mismatch
    /// - [`Error::Permission`] if the anchor is sealed
    /// - [`Error::IntegrityUnavailable`] / [`Error::Unavailable`] on hardware
    ///   failure during commit
    #[tracing::instrument(skip(self, chain), fields(links = chain.len()))]
    pub fn verify_boot_chain(&self, chain: &BootChain) -> Result<()> {
        chain.validate()?;
        self.require_ready(EventCode::ChainRejected)?;
        if self.lock_log()?.log.remaining() < chain.len() {
            return Err(Error::ResourceExhausted);
        }

        let mut intact = true;
        for link in &chain.links {
            let m = &link.measurement;
            let digest_ok = constant_time_eq(sha3_512(&link.artifact).as_bytes(), m.digest.as_bytes());
            let signature_ok = self
                .signer
                .verify(&m.to_signed_bytes(), &m.signature)
                .unwrap_or(false);
            intact &= digest_ok & signature_ok;
        }

        if !intact {
            tracing::error!(links = chain.len(), "boot chain rejected");
            let err = audit_error(
                &self.ledger,
                Error::IntegrityViolation,
                AuditClass::Security,
                EventCode::ChainRejected,
                chain.links.first().map_or(0, |l| l.measurement.sequence),
            );
            if let Err(e) = self.ledger.flush() {
                tracing::warn!(error = %e, "ledger flush after chain rejection failed");
            }
            return Err(err);
        }

        self.commit_chain(chain)
    }

    fn commit_chain(&self, chain: &BootChain) -> Result<()> {
        let mut guard = self.lock_log()?;
        self.require_ready(EventCode::ChainRejected)?;
        if guard.log.remaining() < chain.len() {
            return Err(Error::ResourceExhausted);
        }

        let mut staged = guard.log.clone();
        let mut next_sequence = guard.next_sequence;
        for (i, link) in chain.links.iter().enumerate() {
            let m = link.measurement;
            if let Err(e) = self.extend_register(m.register, &m.digest) {
                // Registers now run ahead of the log
                if i > 0 && self.state() != AnchorState::Error {
                    tracing::error!(extended = i, "boot chain commit interrupted");
                    let cause = if e == Error::IntegrityUnavailable {
                        HalError::Timeout
                    } else {
                        HalError::HardwareFault
                    };
                    self.fault(cause);
                }
                return Err(e);
            }
            staged.push(m)?;
            next_sequence = next_sequence.max(m.sequence.saturating_add(1));
        }
        guard.log = staged;
        guard.next_sequence = next_sequence;
        drop(guard);

        let event = AuditEvent::new(AuditClass::System, Severity::Info, EventCode::ChainAccepted)
            .with_payload(u32::try_from(chain.len()).unwrap_or(u32::MAX).to_le_bytes());
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record chain acceptance");
        }
        Ok(())
    }

    /// Verify `signature` over `data` through the signing provider
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `signature` has the wrong length
    /// - [`Error::IntegrityViolation`] if it does not verify
    pub fn verify_signature(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidParameter);
        }
        match self.signer.verify(data, signature) {
            Ok(true) => Ok(()),
            Ok(false) | Err(CryptoError::InvalidSignature) => {
                tracing::warn!("signature rejected");
                Err(audit_error(
                    &self.ledger,
                    Error::IntegrityViolation,
                    AuditClass::Security,
                    EventCode::SignatureRejected,
                    0,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Freeze the log; later extends fail with `Permission`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless the anchor is `Ready`.
    pub fn seal(&self) -> Result<()> {
        let guard = self.lock_log()?;
        if self.state() != AnchorState::Ready {
            return Err(Error::InvalidParameter);
        }
        self.set_state(AnchorState::Sealed);
        let entries = guard.log.len();
        drop(guard);

        tracing::info!(entries, "trust anchor sealed");
        let event = AuditEvent::new(AuditClass::Security, Severity::Notice, EventCode::AnchorSealed);
        if let Err(e) = self.ledger.append(event) {
            tracing::warn!(error = %e, "failed to record seal");
        }
        Ok(())
    }

    /// Current value of register `index`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `index` is out of range
    /// - [`Error::Busy`] if the log lock cannot be taken in time
    /// - [`Error::Unavailable`] if the device does not answer
    pub fn read_register(&self, index: u32) -> Result<Digest512> {
        if index >= REGISTER_COUNT {
            return Err(Error::InvalidParameter);
        }
        let _guard = self.lock_log()?;
        Ok(self.rot.read_register(index)?)
    }

    /// Copy of the measurement log
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the log lock cannot be taken in time.
    pub fn log_snapshot(&self) -> Result<MeasurementLog> {
        Ok(self.lock_log()?.log.clone())
    }

    /// `n` bytes from the root of trust's entropy source
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `n` exceeds [`MAX_RANDOM_BYTES`]
    /// - [`Error::Unavailable`] if the device does not answer
    pub fn get_random(&self, n: usize) -> Result<Vec<u8>> {
        if n > MAX_RANDOM_BYTES {
            return Err(Error::InvalidParameter);
        }
        let mut out = vec![0u8; n];
        self.rot.get_random(&mut out)?;
        Ok(out)
    }

    /// Produce a signed report binding `nonce` to the current state
    ///
    /// # Errors
    ///
    /// - [`Error::Unavailable`] unless `Ready` or `Sealed`, or if the device
    ///   or signer fails
    /// - [`Error::Busy`] if the log lock cannot be taken in time
    pub fn attest(&self, nonce: [u8; NONCE_SIZE]) -> Result<AttestationReport> {
        if !matches!(self.state(), AnchorState::Ready | AnchorState::Sealed) {
            return Err(Error::Unavailable);
        }
        let guard = self.lock_log()?;
        let mut registers = [Digest512::ZERO; REGISTER_COUNT as usize];
        for (index, slot) in (0..REGISTER_COUNT).zip(registers.iter_mut()) {
            *slot = self.rot.read_register(index)?;
        }
        let mut report = AttestationReport {
            version: REPORT_VERSION,
            nonce,
            timestamp: self.clock.now(),
            registers,
            log_integrity: *guard.log.integrity_hash(),
            log_len: u32::try_from(guard.log.len()).map_err(|_| Error::InvalidParameter)?,
            signature: [0; SIGNATURE_SIZE],
        };
        drop(guard);
        report.signature = self.signer.sign(&report.to_signed_bytes())?;
        Ok(report)
    }
}

impl core::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_common::config::AuditConfig;
    use q_common::time::ManualClock;
    use q_crypto::{Ed25519Provider, SignatureAlgorithm};
    use q_hal::sim::SimRootOfTrust;
    use q_hal::RotCapabilities;
    use std::sync::atomic::AtomicU32;

    use crate::chain::{ChainLink, CHAIN_VERSION};

    struct Fixture {
        rot: Arc<SimRootOfTrust>,
        ledger: Arc<AuditLedger>,
        anchor: TrustAnchor,
    }

    fn fixture_with(rot: SimRootOfTrust) -> Fixture {
        let rot = Arc::new(rot);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(10));
        let ledger = Arc::new(
            AuditLedger::new(&AuditConfig::DEFAULT, &SecureBuffer::from_array([9; 32]), clock.clone())
                .unwrap(),
        );
        let signer = Arc::new(Ed25519Provider::from_seed(&SecureBuffer::from_array([4; 32])));
        let anchor = TrustAnchor::new(AttestConfig::DEFAULT, rot.clone(), signer, ledger.clone(), clock);
        Fixture { rot, ledger, anchor }
    }

    fn fixture() -> Fixture {
        fixture_with(SimRootOfTrust::new([2; 32]))
    }

    #[test]
    fn test_init_reaches_ready() {
        let f = fixture();
        assert_eq!(f.anchor.state(), AnchorState::Uninitialized);
        f.anchor.init().unwrap();
        assert_eq!(f.anchor.state(), AnchorState::Ready);
        assert_eq!(f.anchor.init(), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_init_rejects_weak_device() {
        let weak = RotCapabilities {
            version: 0x10,
            ..SimRootOfTrust::CAPABILITIES
        };
        let f = fixture_with(SimRootOfTrust::with_capabilities([2; 32], weak));
        assert_eq!(f.anchor.init(), Err(Error::Unavailable));
        assert_eq!(f.anchor.state(), AnchorState::Error);

        let no_sig = RotCapabilities {
            signature_algorithms: !SignatureAlgorithm::Ed25519.capability_bit(),
            ..SimRootOfTrust::CAPABILITIES
        };
        let f = fixture_with(SimRootOfTrust::with_capabilities([2; 32], no_sig));
        assert_eq!(f.anchor.init(), Err(Error::Unavailable));
    }

    #[test]
    fn test_init_rejects_stuck_entropy() {
        let f = fixture();
        f.rot.inject_stuck_entropy(true);
        assert_eq!(f.anchor.init(), Err(Error::Unavailable));
        assert_eq!(f.anchor.state(), AnchorState::Error);

        f.rot.inject_stuck_entropy(false);
        f.anchor.init().unwrap();
        assert_eq!(f.anchor.state(), AnchorState::Ready);
    }

    #[test]
    fn test_extend_before_init() {
        let f = fixture();
        assert_eq!(f.anchor.extend_measurement(0, b"x"), Err(Error::Unavailable));
    }

    #[test]
    fn test_extend_accumulates_and_logs() {
        let f = fixture();
        f.anchor.init().unwrap();
        let m = f.anchor.extend_measurement(0, b"bootloader-v1").unwrap();
        assert_eq!(m.digest, sha3_512(b"bootloader-v1"));
        assert_eq!(m.sequence, 1);
        assert_eq!(f.anchor.read_register(0).unwrap(), Digest512::ZERO.extend(&m.digest));
        assert_eq!(f.anchor.log_snapshot().unwrap().entries(), &[m]);
        f.anchor.verify_signature(&m.to_signed_bytes(), &m.signature).unwrap();
    }

    #[test]
    fn test_extend_index_out_of_range() {
        let f = fixture();
        f.anchor.init().unwrap();
        assert_eq!(
            f.anchor.extend_measurement(REGISTER_COUNT, b"x"),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_timeouts_retried_then_succeed() {
        let f = fixture();
        f.anchor.init().unwrap();
        f.rot.inject_timeouts(2);
        assert!(f.anchor.extend_measurement(1, b"kernel").is_ok());
    }

    #[test]
    fn test_timeouts_exhaust_retries() {
        let f = fixture();
        f.anchor.init().unwrap();
        f.rot.inject_timeouts(10);
        assert_eq!(
            f.anchor.extend_measurement(1, b"kernel"),
            Err(Error::IntegrityUnavailable)
        );
        assert_eq!(f.anchor.state(), AnchorState::Ready);
        assert!(f.anchor.log_snapshot().unwrap().is_empty());
        assert_eq!(f.anchor.read_register(1).unwrap(), Digest512::ZERO);
    }

    #[test]
    fn test_fault_enters_error_state() {
        let f = fixture();
        f.anchor.init().unwrap();
        f.rot.inject_fault(true);
        assert_eq!(f.anchor.extend_measurement(0, b"x"), Err(Error::Unavailable));
        assert_eq!(f.anchor.state(), AnchorState::Error);
        assert_eq!(f.ledger.stats().total_appended, 1);
    }

    #[test]
    fn test_sealed_refuses_extend() {
        let f = fixture();
        f.anchor.init().unwrap();
        f.anchor.seal().unwrap();
        assert_eq!(f.anchor.extend_measurement(0, b"x"), Err(Error::Permission));
        let last = f.ledger.records().unwrap().pop().unwrap();
        assert_eq!(last.code, EventCode::ExtendRefused);
        assert!(last.critical);
        assert!(f.anchor.read_register(0).is_ok());
    }

    /// Lets `allowed` extends through, then times out on every call
    struct StallingRot {
        inner: SimRootOfTrust,
        allowed: AtomicU32,
    }

    impl RootOfTrust for StallingRot {
        fn probe(&self) -> q_hal::HalResult<RotCapabilities> {
            self.inner.probe()
        }

        fn extend(&self, index: u32, digest: &Digest512) -> q_hal::HalResult<Digest512> {
            let passed = self
                .allowed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !passed {
                return Err(HalError::Timeout);
            }
            self.inner.extend(index, digest)
        }

        fn read_register(&self, index: u32) -> q_hal::HalResult<Digest512> {
            self.inner.read_register(index)
        }

        fn get_random(&self, dest: &mut [u8]) -> q_hal::HalResult<()> {
            self.inner.get_random(dest)
        }
    }

    fn two_link_chain() -> BootChain {
        let source = fixture();
        source.anchor.init().unwrap();
        let links = [(0, b"loader".as_slice()), (1, b"kernel".as_slice())]
            .into_iter()
            .map(|(index, artifact)| ChainLink {
                measurement: source.anchor.extend_measurement(index, artifact).unwrap(),
                artifact: artifact.to_vec(),
            })
            .collect();
        BootChain::new(links)
    }

    #[test]
    fn test_chain_commit_failure_leaves_log_untouched() {
        let rot = Arc::new(StallingRot {
            inner: SimRootOfTrust::new([2; 32]),
            allowed: AtomicU32::new(2),
        });
        let f = fixture();
        let anchor = TrustAnchor::new(
            AttestConfig::DEFAULT,
            rot,
            Arc::new(Ed25519Provider::from_seed(&SecureBuffer::from_array([4; 32]))),
            f.ledger.clone(),
            Arc::new(ManualClock::new(10)),
        );
        anchor.init().unwrap();
        anchor.extend_measurement(2, b"config").unwrap();
        let log_before = anchor.log_snapshot().unwrap();
        let appended_before = f.ledger.stats().total_appended;

        let chain = two_link_chain();
        assert_eq!(anchor.verify_boot_chain(&chain), Err(Error::IntegrityUnavailable));

        assert_eq!(anchor.log_snapshot().unwrap(), log_before);
        assert_eq!(anchor.state(), AnchorState::Error);
        assert_eq!(f.ledger.stats().total_appended, appended_before + 1);
        let fault = f.ledger.records().unwrap().pop().unwrap();
        assert_eq!(fault.code, EventCode::AnchorFault);
        assert_eq!(fault.class, AuditClass::Hardware);
    }

    #[test]
    fn test_first_link_timeout_keeps_anchor_ready() {
        let rot = Arc::new(StallingRot {
            inner: SimRootOfTrust::new([2; 32]),
            allowed: AtomicU32::new(0),
        });
        let f = fixture();
        let anchor = TrustAnchor::new(
            AttestConfig::DEFAULT,
            rot,
            Arc::new(Ed25519Provider::from_seed(&SecureBuffer::from_array([4; 32]))),
            f.ledger.clone(),
            Arc::new(ManualClock::new(10)),
        );
        anchor.init().unwrap();

        assert_eq!(
            anchor.verify_boot_chain(&two_link_chain()),
            Err(Error::IntegrityUnavailable)
        );
        assert_eq!(anchor.state(), AnchorState::Ready);
        assert!(anchor.log_snapshot().unwrap().is_empty());
        assert_eq!(f.ledger.stats().total_appended, 0);
    }

    #[test]
    fn test_malformed_chain_on_sealed_anchor_is_invalid() {
        let f = fixture();
        f.anchor.init().unwrap();
        let chain = two_link_chain();
        f.anchor.seal().unwrap();
        let appended = f.ledger.stats().total_appended;

        let mut wrong_version = chain.clone();
        wrong_version.version = CHAIN_VERSION + 1;
        assert_eq!(f.anchor.verify_boot_chain(&wrong_version), Err(Error::InvalidParameter));
        assert_eq!(
            f.anchor.verify_boot_chain(&BootChain::new(Vec::new())),
            Err(Error::InvalidParameter)
        );
        assert_eq!(f.ledger.stats().total_appended, appended);

        assert_eq!(f.anchor.verify_boot_chain(&chain), Err(Error::Permission));
        assert_eq!(f.ledger.stats().total_appended, appended + 1);
    }

    #[test]
    fn test_signature_length_checked() {
        let f = fixture();
        assert_eq!(
            f.anchor.verify_signature(b"data", &[0; 10]),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            f.anchor.verify_signature(b"data", &[0; SIGNATURE_SIZE]),
            Err(Error::IntegrityViolation)
        );
    }

    #[test]
    fn test_get_random_bounds() {
        let f = fixture();
        assert_eq!(f.anchor.get_random(16).unwrap().len(), 16);
        assert_eq!(f.anchor.get_random(MAX_RANDOM_BYTES + 1), Err(Error::InvalidParameter));
    }
}
