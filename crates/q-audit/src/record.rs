// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Audit record types
//!
//! An [`AuditEvent`] is what a component submits; an [`AuditRecord`] is what
//! the ledger stores after assigning a sequence number, stamping it and
//! sealing its header with a MAC. Records are immutable once stored.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::DeflateDecoder;
use q_common::{Error, Result, Timestamp};
use q_crypto::{Digest256, MAC_SIZE};
use serde::{Deserialize, Serialize};

/// Maximum stored (post-compression) payload size in bytes
pub const MAX_PAYLOAD: usize = 4096;

/// Size of the MAC'd header: sequence, timestamp, class, payload hash
pub const MAC_HEADER_SIZE: usize = 8 + 8 + 1 + 32;

// ============================================================================
// Class and Severity
// ============================================================================

/// Audit record class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuditClass {
    /// Authorization and integrity decisions
    Security = 1,
    /// Component lifecycle and configuration
    System = 2,
    /// Hardware events
    Hardware = 4,
    /// Execution-context events
    Process = 8,
}

impl AuditClass {
    /// All classes, in drop-counter order
    pub const ALL: [Self; 4] = [Self::Security, Self::System, Self::Hardware, Self::Process];

    /// Index into per-class counters
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Security => 0,
            Self::System => 1,
            Self::Hardware => 2,
            Self::Process => 3,
        }
    }

    /// Decode from the raw class bit
    #[must_use]
    pub const fn from_bits(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Security),
            2 => Some(Self::System),
            4 => Some(Self::Hardware),
            8 => Some(Self::Process),
            _ => None,
        }
    }
}

/// Set of audit classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditClassMask(u8);

impl AuditClassMask {
    /// Every class
    pub const ALL: Self = Self(0x0F);
    /// No class
    pub const NONE: Self = Self(0);

    /// Mask from raw bits (unknown bits discarded)
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Mask containing one class
    #[must_use]
    pub const fn only(class: AuditClass) -> Self {
        Self(class as u8)
    }

    /// Add a class
    #[must_use]
    pub const fn with(self, class: AuditClass) -> Self {
        Self(self.0 | class as u8)
    }

    /// Membership test
    #[must_use]
    pub const fn contains(&self, class: AuditClass) -> bool {
        self.0 & (class as u8) != 0
    }
}

/// Record severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    /// Debug detail
    Debug = 0,
    /// Normal operation
    Info = 1,
    /// Significant but expected
    Notice = 2,
    /// Potential problem
    Warning = 3,
    /// Operation failed
    Error = 4,
    /// Security-critical failure
    Critical = 5,
}

impl From<u8> for Severity {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Notice,
            3 => Self::Warning,
            4 => Self::Error,
            _ => Self::Critical,
        }
    }
}

// ============================================================================
// Event Codes
// ============================================================================

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventCode {
    /// Measurement extended into a register
    MeasurementExtended = 0x0101,
    /// Boot chain verified and committed
    ChainAccepted = 0x0102,
    /// Boot chain rejected
    ChainRejected = 0x0103,
    /// Signature verification failed
    SignatureRejected = 0x0104,
    /// Trust anchor sealed
    AnchorSealed = 0x0105,
    /// Trust anchor entered the error state
    AnchorFault = 0x0106,
    /// Measurement refused because the anchor is sealed
    ExtendRefused = 0x0107,

    /// Region protected
    RegionProtected = 0x0201,
    /// Region flags updated
    RegionUpdated = 0x0202,
    /// Region released
    RegionReleased = 0x0203,
    /// Memory access denied
    AccessDenied = 0x0204,
    /// Protection table reset
    TableReset = 0x0205,
    /// DMA request denied
    DmaDenied = 0x0206,
    /// DMA post-transfer verification failed
    DmaVerifyFailed = 0x0207,

    /// Context entered restricted mode
    ContextRestricted = 0x0301,
    /// Resource rights limited
    ResourceLimited = 0x0302,
    /// Resource limit refused
    LimitDenied = 0x0303,
    /// Policy check granted
    PolicyGranted = 0x0304,
    /// Policy check denied by rule
    PolicyDenied = 0x0305,
    /// Policy not enforcing
    PolicyNotEnforcing = 0x0306,
    /// Policy invalid or disabled
    PolicyInvalid = 0x0307,
    /// Policy registry reloaded
    PoliciesReloaded = 0x0308,
    /// Request exceeded a context's capabilities
    CapabilityDenied = 0x0309,

    /// Core started
    CoreStarted = 0x0401,
    /// Core shut down
    CoreShutdown = 0x0402,
    /// Operation failed (generic error path)
    OperationFailed = 0x0403,

    /// Unrecognized code read back from storage
    Unknown = 0xFFFF,
}

impl From<u16> for EventCode {
    fn from(v: u16) -> Self {
        match v {
            0x0101 => Self::MeasurementExtended,
            0x0102 => Self::ChainAccepted,
            0x0103 => Self::ChainRejected,
            0x0104 => Self::SignatureRejected,
            0x0105 => Self::AnchorSealed,
            0x0106 => Self::AnchorFault,
            0x0107 => Self::ExtendRefused,
            0x0201 => Self::RegionProtected,
            0x0202 => Self::RegionUpdated,
            0x0203 => Self::RegionReleased,
            0x0204 => Self::AccessDenied,
            0x0205 => Self::TableReset,
            0x0206 => Self::DmaDenied,
            0x0207 => Self::DmaVerifyFailed,
            0x0301 => Self::ContextRestricted,
            0x0302 => Self::ResourceLimited,
            0x0303 => Self::LimitDenied,
            0x0304 => Self::PolicyGranted,
            0x0305 => Self::PolicyDenied,
            0x0306 => Self::PolicyNotEnforcing,
            0x0307 => Self::PolicyInvalid,
            0x0308 => Self::PoliciesReloaded,
            0x0309 => Self::CapabilityDenied,
            0x0401 => Self::CoreStarted,
            0x0402 => Self::CoreShutdown,
            0x0403 => Self::OperationFailed,
            _ => Self::Unknown,
        }
    }
}

// ============================================================================
// Event (input) and Record (stored)
// ============================================================================

/// An event submitted for auditing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Class
    pub class: AuditClass,
    /// Severity
    pub severity: Severity,
    /// Event code
    pub code: EventCode,
    /// Correlation id linking the record to its originating context
    pub correlation: u64,
    /// Uncompressed payload
    pub payload: Vec<u8>,
}

impl AuditEvent {
    /// Create an event with no payload
    #[must_use]
    pub const fn new(class: AuditClass, severity: Severity, code: EventCode) -> Self {
        Self {
            class,
            severity,
            code,
            correlation: 0,
            payload: Vec::new(),
        }
    }

    /// Attach a correlation id
    #[must_use]
    pub const fn with_correlation(mut self, correlation: u64) -> Self {
        self.correlation = correlation;
        self
    }

    /// Attach a payload
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Whether this event must bypass filtering and use reserved headroom
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.class == AuditClass::Security && self.severity >= Severity::Error
    }
}

/// A sealed, immutable audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Global sequence number, starting at 1
    pub sequence: u64,
    /// Time of append
    pub timestamp: Timestamp,
    /// Class
    pub class: AuditClass,
    /// Severity
    pub severity: Severity,
    /// Event code
    pub code: EventCode,
    /// Correlation id
    pub correlation: u64,
    /// Whether `payload` is DEFLATE-compressed
    pub compressed: bool,
    /// Length of the payload before compression
    pub original_len: u32,
    /// Stored payload bytes
    pub payload: Vec<u8>,
    /// SHA3-256 of the stored payload bytes
    #[serde(with = "hex_digest")]
    pub payload_hash: Digest256,
    /// HMAC over the header
    pub mac: [u8; MAC_SIZE],
    /// Set when a critical event was recorded
    pub critical: bool,
}

impl AuditRecord {
    /// Bytes covered by the MAC
    #[must_use]
    pub fn mac_header(
        sequence: u64,
        timestamp: Timestamp,
        class: AuditClass,
        payload_hash: &Digest256,
    ) -> [u8; MAC_HEADER_SIZE] {
        let mut header = [0u8; MAC_HEADER_SIZE];
        header[0..8].copy_from_slice(&sequence.to_le_bytes());
        header[8..16].copy_from_slice(&timestamp.as_millis().to_le_bytes());
        header[16] = class as u8;
        header[17..].copy_from_slice(payload_hash.as_bytes());
        header
    }

    /// Header bytes of this record
    #[must_use]
    pub fn header(&self) -> [u8; MAC_HEADER_SIZE] {
        Self::mac_header(self.sequence, self.timestamp, self.class, &self.payload_hash)
    }

    /// Payload in its original, uncompressed form
    ///
    /// # Errors
    ///
    /// Returns [`Error::IntegrityViolation`] if a compressed payload does not
    /// inflate to its recorded length.
    pub fn payload(&self) -> Result<Cow<'_, [u8]>> {
        if !self.compressed {
            return Ok(Cow::Borrowed(&self.payload));
        }
        let expected = usize::try_from(self.original_len).map_err(|_| Error::IntegrityViolation)?;
        let mut out = Vec::with_capacity(expected);
        DeflateDecoder::new(self.payload.as_slice())
            .take(u64::from(self.original_len) + 1)
            .read_to_end(&mut out)
            .map_err(|_| Error::IntegrityViolation)?;
        if out.len() != expected {
            return Err(Error::IntegrityViolation);
        }
        Ok(Cow::Owned(out))
    }
}

mod hex_digest {
    use q_crypto::Digest256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &Digest256, s: S) -> Result<S::Ok, S::Error> {
        let text: String = digest.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Digest256, D::Error> {
        let text = String::deserialize(d)?;
        if text.len() != 64 {
            return Err(serde::de::Error::custom("digest must be 64 hex characters"));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = text.get(i * 2..i * 2 + 2).ok_or_else(|| serde::de::Error::custom("bad hex"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(serde::de::Error::custom)?;
        }
        Ok(Digest256::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_mask() {
        let mask = AuditClassMask::only(AuditClass::Security).with(AuditClass::Hardware);
        assert!(mask.contains(AuditClass::Security));
        assert!(mask.contains(AuditClass::Hardware));
        assert!(!mask.contains(AuditClass::System));
        assert_eq!(AuditClassMask::from_bits(0xFF), AuditClassMask::ALL);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Debug < Severity::Info);
        assert_eq!(Severity::from(9), Severity::Critical);
    }

    #[test]
    fn test_event_code_decode() {
        assert_eq!(EventCode::from(0x0305), EventCode::PolicyDenied);
        assert_eq!(EventCode::from(0x7777), EventCode::Unknown);
        assert_eq!(EventCode::PolicyDenied as u16, 0x0305);
    }

    #[test]
    fn test_critical_classification() {
        let denied = AuditEvent::new(AuditClass::Security, Severity::Error, EventCode::AccessDenied);
        let granted = AuditEvent::new(AuditClass::Security, Severity::Info, EventCode::PolicyGranted);
        let noisy = AuditEvent::new(AuditClass::System, Severity::Critical, EventCode::TableReset);
        assert!(denied.is_critical());
        assert!(!granted.is_critical());
        assert!(!noisy.is_critical());
    }

    #[test]
    fn test_mac_header_layout() {
        let hash = Digest256::from_bytes([0xAB; 32]);
        let header = AuditRecord::mac_header(2, Timestamp::from_millis(3), AuditClass::Process, &hash);
        assert_eq!(header[0], 2);
        assert_eq!(header[8], 3);
        assert_eq!(header[16], 8);
        assert_eq!(header[17], 0xAB);
        assert_eq!(header.len(), MAC_HEADER_SIZE);
    }
}
