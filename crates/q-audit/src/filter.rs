// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Ingestion filter
//!
//! Sheds low-value records before they reach the ring. The filter can be
//! made load-dependent: below the threshold every record is admitted.
//! Critical events are never offered to the filter.

use q_common::config::AuditConfig;

use crate::record::{AuditClassMask, AuditEvent, Severity};

/// Class and severity filter applied at append time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestFilter {
    /// Admitted classes
    pub classes: AuditClassMask,
    /// Lowest admitted severity
    pub min_severity: Severity,
    /// Main-ring fill percentage at which filtering starts (0 = always)
    pub load_threshold_percent: u8,
}

impl IngestFilter {
    /// Admit everything
    pub const PERMISSIVE: Self = Self {
        classes: AuditClassMask::ALL,
        min_severity: Severity::Debug,
        load_threshold_percent: 0,
    };

    /// Build from configuration
    #[must_use]
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            classes: AuditClassMask::from_bits(config.class_mask),
            min_severity: Severity::from(config.min_severity),
            load_threshold_percent: config.load_threshold_percent.min(100),
        }
    }

    /// Whether filtering is in force at the given fill level
    #[must_use]
    pub const fn engaged(&self, fill_percent: u8) -> bool {
        self.load_threshold_percent == 0 || fill_percent >= self.load_threshold_percent
    }

    /// Whether `event` is admitted at the given fill level
    #[must_use]
    pub fn admits(&self, event: &AuditEvent, fill_percent: u8) -> bool {
        if !self.engaged(fill_percent) {
            return true;
        }
        self.classes.contains(event.class) && event.severity >= self.min_severity
    }
}

impl Default for IngestFilter {
    fn default() -> Self {
        Self::PERMISSIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuditClass, EventCode};

    fn event(class: AuditClass, severity: Severity) -> AuditEvent {
        AuditEvent::new(class, severity, EventCode::OperationFailed)
    }

    #[test]
    fn test_permissive_admits_all() {
        let filter = IngestFilter::PERMISSIVE;
        assert!(filter.admits(&event(AuditClass::Process, Severity::Debug), 100));
    }

    #[test]
    fn test_class_and_severity() {
        let filter = IngestFilter {
            classes: AuditClassMask::only(AuditClass::Security),
            min_severity: Severity::Warning,
            load_threshold_percent: 0,
        };
        assert!(filter.admits(&event(AuditClass::Security, Severity::Warning), 0));
        assert!(!filter.admits(&event(AuditClass::Security, Severity::Info), 0));
        assert!(!filter.admits(&event(AuditClass::Hardware, Severity::Critical), 0));
    }

    #[test]
    fn test_load_threshold() {
        let filter = IngestFilter {
            classes: AuditClassMask::NONE,
            min_severity: Severity::Critical,
            load_threshold_percent: 75,
        };
        let e = event(AuditClass::System, Severity::Info);
        assert!(filter.admits(&e, 74));
        assert!(!filter.admits(&e, 75));
    }

    #[test]
    fn test_from_config() {
        let config = AuditConfig {
            class_mask: 0x03,
            min_severity: 2,
            load_threshold_percent: 200,
            ..AuditConfig::DEFAULT
        };
        let filter = IngestFilter::from_config(&config);
        assert_eq!(filter.min_severity, Severity::Notice);
        assert_eq!(filter.load_threshold_percent, 100);
        assert!(filter.classes.contains(AuditClass::System));
        assert!(!filter.classes.contains(AuditClass::Hardware));
    }
}
