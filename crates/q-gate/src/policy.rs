// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Administered security policies
//!
//! Policies are loaded from a [`PolicySource`]. The TOML source reads a
//! list of `[[policy]]` tables:
//!
//! ```toml
//! [[policy]]
//! id = 1
//! name = "storage"
//! flags = ["enabled", "enforcing", "auditing"]
//! priority = 10
//! allow = ["read", "write", "seek"]
//! ```
//!
//! Exactly one of `allow` or `deny` must be present. `Custom` rules can only
//! be installed from code.

use core::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use q_common::config::MAX_POLICIES;
use q_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::rights::Rights;

/// Policy state flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct PolicyFlags(u32);

const FLAG_NAMES: [(PolicyFlags, &str); 4] = [
    (PolicyFlags::ENABLED, "enabled"),
    (PolicyFlags::ENFORCING, "enforcing"),
    (PolicyFlags::AUDITING, "auditing"),
    (PolicyFlags::CRITICAL, "critical"),
];

impl PolicyFlags {
    /// Policy is active
    pub const ENABLED: Self = Self(0x1);
    /// Decisions are enforced
    pub const ENFORCING: Self = Self(0x2);
    /// Decisions are audited
    pub const AUDITING: Self = Self(0x4);
    /// Policy protects a critical resource
    pub const CRITICAL: Self = Self(0x8);

    /// Parse raw bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] on unknown bits.
    pub const fn from_bits(bits: u32) -> Result<Self> {
        if bits & !0xF != 0 {
            Err(Error::InvalidParameter)
        } else {
            Ok(Self(bits))
        }
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every flag of `other` is set
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for PolicyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagsRepr {
    Bits(u32),
    Names(Vec<String>),
}

impl<'de> Deserialize<'de> for PolicyFlags {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> core::result::Result<Self, D::Error> {
        let parsed = match FlagsRepr::deserialize(d)? {
            FlagsRepr::Bits(bits) => Self::from_bits(bits),
            FlagsRepr::Names(names) => names.iter().try_fold(Self::default(), |acc, name| {
                FLAG_NAMES
                    .iter()
                    .find(|(_, n)| n.eq_ignore_ascii_case(name))
                    .map(|(flag, _)| acc | *flag)
                    .ok_or(Error::InvalidParameter)
            }),
        };
        parsed.map_err(|_| serde::de::Error::custom("unknown policy flag"))
    }
}

/// Caller-supplied decision logic
pub trait PolicyRule: Send + Sync {
    /// Whether `ctx` may perform `access`
    fn permits(&self, ctx: &ExecutionContext, access: Rights) -> bool;

    /// Short description for logs
    fn describe(&self) -> &str {
        "custom"
    }
}

impl<F> PolicyRule for F
where
    F: Fn(&ExecutionContext, Rights) -> bool + Send + Sync,
{
    fn permits(&self, ctx: &ExecutionContext, access: Rights) -> bool {
        self(ctx, access)
    }
}

/// Decision rule of a policy
#[derive(Clone)]
pub enum Rule {
    /// Grant iff the request is a subset of these rights
    AllowList(Rights),
    /// Grant iff the request shares no right with these
    DenyList(Rights),
    /// Delegate to caller code
    Custom(Arc<dyn PolicyRule>),
}

impl Rule {
    /// Evaluate the rule
    #[must_use]
    pub fn permits(&self, ctx: &ExecutionContext, access: Rights) -> bool {
        match self {
            Self::AllowList(allowed) => access.is_subset_of(*allowed),
            Self::DenyList(denied) => !access.intersects(*denied),
            Self::Custom(rule) => rule.permits(ctx, access),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowList(r) => write!(f, "AllowList({r})"),
            Self::DenyList(r) => write!(f, "DenyList({r})"),
            Self::Custom(rule) => write!(f, "Custom({})", rule.describe()),
        }
    }
}

/// One administered policy
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Registry slot, `< MAX_POLICIES`
    pub id: u32,
    /// Display name
    pub name: String,
    /// State flags
    pub flags: PolicyFlags,
    /// Higher wins when listing
    pub priority: u8,
    /// Decision rule
    pub rule: Rule,
}

impl SecurityPolicy {
    /// Enabled, enforcing policy with the given rule
    #[must_use]
    pub fn enforcing(id: u32, name: impl Into<String>, rule: Rule) -> Self {
        Self {
            id,
            name: name.into(),
            flags: PolicyFlags::ENABLED | PolicyFlags::ENFORCING,
            priority: 0,
            rule,
        }
    }

    /// Replace the flags
    #[must_use]
    pub fn with_flags(mut self, flags: PolicyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Where the gate loads its policies from
pub trait PolicySource: Send + Sync {
    /// Read the full policy set
    ///
    /// # Errors
    ///
    /// Implementation-defined; [`Error::Unavailable`] when the source cannot
    /// be reached and [`Error::InvalidParameter`] when it is malformed.
    fn load(&self) -> Result<Vec<SecurityPolicy>>;
}

/// Fixed in-memory policy set
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource(pub Vec<SecurityPolicy>);

impl PolicySource for StaticPolicySource {
    fn load(&self) -> Result<Vec<SecurityPolicy>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyEntry {
    id: u32,
    name: String,
    #[serde(default)]
    flags: PolicyFlags,
    #[serde(default)]
    priority: u8,
    allow: Option<Rights>,
    deny: Option<Rights>,
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policy: Vec<PolicyEntry>,
}

impl TryFrom<PolicyEntry> for SecurityPolicy {
    type Error = Error;

    fn try_from(entry: PolicyEntry) -> Result<Self> {
        let rule = match (entry.allow, entry.deny) {
            (Some(allow), None) => Rule::AllowList(allow),
            (None, Some(deny)) => Rule::DenyList(deny),
            _ => return Err(Error::InvalidParameter),
        };
        if entry.id >= MAX_POLICIES {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            id: entry.id,
            name: entry.name,
            flags: entry.flags,
            priority: entry.priority,
            rule,
        })
    }
}

/// Parse a TOML policy document
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] on malformed TOML, unknown rights or
/// flags, an out-of-range id or an entry without exactly one rule.
pub fn parse_policies(text: &str) -> Result<Vec<SecurityPolicy>> {
    let doc: PolicyDocument = toml::from_str(text).map_err(|e| {
        tracing::warn!(error = %e, "malformed policy document");
        Error::InvalidParameter
    })?;
    doc.policy.into_iter().map(SecurityPolicy::try_from).collect()
}

/// Policies read from a TOML file on every load
#[derive(Debug, Clone)]
pub struct TomlPolicySource {
    path: PathBuf,
}

impl TomlPolicySource {
    /// Source reading `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File this source reads
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PolicySource for TomlPolicySource {
    fn load(&self) -> Result<Vec<SecurityPolicy>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "policy file unreadable");
            Error::Unavailable
        })?;
        parse_policies(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(1, "test", 0)
    }

    #[test]
    fn test_rule_variants() {
        let allow = Rule::AllowList(Rights::READ | Rights::SEEK);
        assert!(allow.permits(&ctx(), Rights::READ));
        assert!(!allow.permits(&ctx(), Rights::READ | Rights::WRITE));

        let deny = Rule::DenyList(Rights::EXEC);
        assert!(deny.permits(&ctx(), Rights::READ | Rights::WRITE));
        assert!(!deny.permits(&ctx(), Rights::EXEC | Rights::READ));

        let custom = Rule::Custom(Arc::new(|ctx: &ExecutionContext, _: Rights| ctx.principal() == 1));
        assert!(custom.permits(&ctx(), Rights::ALL));
        assert_eq!(format!("{custom:?}"), "Custom(custom)");
    }

    #[test]
    fn test_parse_document() {
        let text = r#"
            [[policy]]
            id = 1
            name = "storage"
            flags = ["enabled", "enforcing"]
            priority = 10
            allow = ["read", "write"]

            [[policy]]
            id = 2
            name = "no-exec"
            flags = 7
            deny = ["exec"]
        "#;
        let policies = parse_policies(text).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].flags, PolicyFlags::ENABLED | PolicyFlags::ENFORCING);
        assert_eq!(policies[0].priority, 10);
        assert!(matches!(policies[1].rule, Rule::DenyList(r) if r == Rights::EXEC));
        assert!(policies[1].flags.contains(PolicyFlags::AUDITING));
    }

    #[test]
    fn test_parse_rejections() {
        let both = "[[policy]]\nid = 1\nname = \"x\"\nallow = 1\ndeny = 2\n";
        assert_eq!(parse_policies(both).unwrap_err(), Error::InvalidParameter);
        let neither = "[[policy]]\nid = 1\nname = \"x\"\n";
        assert_eq!(parse_policies(neither).unwrap_err(), Error::InvalidParameter);
        let out_of_range = format!("[[policy]]\nid = {MAX_POLICIES}\nname = \"x\"\nallow = 1\n");
        assert_eq!(parse_policies(&out_of_range).unwrap_err(), Error::InvalidParameter);
        let bad_flag = "[[policy]]\nid = 1\nname = \"x\"\nflags = [\"loud\"]\nallow = 1\n";
        assert_eq!(parse_policies(bad_flag).unwrap_err(), Error::InvalidParameter);
        assert!(parse_policies("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let source = TomlPolicySource::new("/nonexistent/qbitel/policies.toml");
        assert_eq!(source.load().unwrap_err(), Error::Unavailable);
    }
}
