// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Configuration for Qbitel TrustCore
//!
//! Every component has its own configuration block with a `DEFAULT` constant.
//! The blocks are aggregated into [`CoreConfig`], which can be provisioned
//! from a TOML document. Missing keys fall back to the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::log::LogLevel;

/// Hard upper bound on protected regions per table
pub const MAX_REGIONS: usize = 1024;

/// Hard upper bound on registered security policies
pub const MAX_POLICIES: u32 = 32;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration document is malformed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl From<ConfigError> for Error {
    fn from(_: ConfigError) -> Self {
        Error::InvalidParameter
    }
}

/// Top-level configuration for a `SecurityCore` instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Bounded wait applied to every internal lock acquisition
    pub lock_timeout_ms: u64,
    /// Logging configuration
    pub log: LogConfig,
    /// Trust anchor configuration
    pub attest: AttestConfig,
    /// Protection table configuration
    pub protect: ProtectConfig,
    /// Capability gate configuration
    pub gate: GateConfig,
    /// Audit ledger configuration
    pub audit: AuditConfig,
}

impl CoreConfig {
    /// Default configuration
    pub const DEFAULT: Self = Self {
        lock_timeout_ms: 50,
        log: LogConfig::DEFAULT,
        attest: AttestConfig::DEFAULT,
        protect: ProtectConfig::DEFAULT,
        gate: GateConfig::DEFAULT,
        audit: AuditConfig::DEFAULT,
    };

    /// Parse a configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for inconsistent values.
    pub fn from_toml_str(text: &str) -> core::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> core::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first inconsistent field.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be non-zero"));
        }
        if self.audit.capacity == 0 {
            return Err(ConfigError::Invalid("audit.capacity must be non-zero"));
        }
        if self.audit.reserved == 0 || self.audit.reserved >= self.audit.capacity {
            return Err(ConfigError::Invalid("audit.reserved must be in 1..capacity"));
        }
        if self.audit.load_threshold_percent > 100 {
            return Err(ConfigError::Invalid("audit.load_threshold_percent exceeds 100"));
        }
        if self.protect.max_regions == 0 || self.protect.max_regions > MAX_REGIONS {
            return Err(ConfigError::Invalid("protect.max_regions out of range"));
        }
        if self.gate.max_policies == 0 || self.gate.max_policies > MAX_POLICIES {
            return Err(ConfigError::Invalid("gate.max_policies out of range"));
        }
        Ok(())
    }

    /// Lock timeout as a [`core::time::Duration`]
    #[must_use]
    pub const fn lock_timeout(&self) -> core::time::Duration {
        core::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Logging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when `QBITEL_LOG` is not set
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LogConfig {
    /// Default logging configuration
    pub const DEFAULT: Self = Self {
        level: LogLevel::Info,
        json: false,
    };
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Trust anchor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    /// Minimum accepted root-of-trust version
    pub min_rot_version: u16,
    /// Retries on root-of-trust timeout before giving up
    pub max_retries: u32,
    /// Initial backoff between retries, doubled each attempt
    pub backoff_base_ms: u64,
    /// Run the entropy self-test during init
    pub entropy_check: bool,
}

impl AttestConfig {
    /// Default trust anchor configuration
    pub const DEFAULT: Self = Self {
        min_rot_version: 0x20,
        max_retries: 3,
        backoff_base_ms: 1,
        entropy_check: true,
    };
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A region protected at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Base address
    pub base: u64,
    /// Size in bytes
    pub size: u64,
    /// Raw protection flags
    pub flags: u32,
    /// Device-address mask for DMA-capable regions
    #[serde(default)]
    pub device_mask: Option<u64>,
}

/// Protection table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectConfig {
    /// Number of table slots
    pub max_regions: usize,
    /// Enable optional hardware protection features found at init
    pub enable_hw_features: bool,
    /// Regions protected during core init
    pub default_regions: Vec<RegionConfig>,
}

impl ProtectConfig {
    /// Default protection table configuration
    pub const DEFAULT: Self = Self {
        max_regions: MAX_REGIONS,
        enable_hw_features: true,
        default_regions: Vec::new(),
    };
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Capability gate configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Upper bound on policy ids (exclusive)
    pub max_policies: u32,
}

impl GateConfig {
    /// Default capability gate configuration
    pub const DEFAULT: Self = Self {
        max_policies: MAX_POLICIES,
    };
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Audit ledger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Main ring capacity
    pub capacity: usize,
    /// Slots reserved for displaced critical records
    pub reserved: usize,
    /// Payloads longer than this are compressed
    pub compress_threshold: usize,
    /// Raw class mask admitted by the ingestion filter
    pub class_mask: u8,
    /// Minimum severity admitted by the ingestion filter
    pub min_severity: u8,
    /// Main-ring fill percentage at which the filter engages (0 = always)
    pub load_threshold_percent: u8,
}

impl AuditConfig {
    /// Default audit ledger configuration
    pub const DEFAULT: Self = Self {
        capacity: 1024,
        reserved: 64,
        compress_threshold: 1024,
        class_mask: 0x0F,
        min_severity: 0,
        load_threshold_percent: 0,
    };
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CoreConfig::DEFAULT.validate().is_ok());
        assert_eq!(CoreConfig::default(), CoreConfig::DEFAULT);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            lock_timeout_ms = 10

            [audit]
            capacity = 16
            reserved = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.lock_timeout_ms, 10);
        assert_eq!(config.audit.capacity, 16);
        assert_eq!(config.audit.compress_threshold, 1024);
        assert_eq!(config.attest.max_retries, 3);
    }

    #[test]
    fn test_reserved_must_fit() {
        let err = CoreConfig::from_toml_str("[audit]\ncapacity = 4\nreserved = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_region_list() {
        let config = CoreConfig::from_toml_str(
            r#"
            [[protect.default_regions]]
            base = 4096
            size = 4096
            flags = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.protect.default_regions.len(), 1);
        assert_eq!(config.protect.default_regions[0].device_mask, None);
    }

    #[test]
    fn test_malformed_toml() {
        let err = CoreConfig::from_toml_str("lock_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert_eq!(Error::from(err), Error::InvalidParameter);
    }
}
