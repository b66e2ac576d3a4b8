// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-GATE for Qbitel TrustCore
//!
//! Authorization by two independent checks:
//!
//! - **Capabilities**: each execution context narrows ambient authority to a
//!   ceiling that only ever shrinks
//! - **Policies**: administered rules (`AllowList`, `DenyList`, `Custom`)
//!   loaded from a [`PolicySource`]
//!
//! Every policy decision is written to the audit ledger.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod gate;
pub mod policy;
pub mod rights;

pub use context::{ExecutionContext, Mode, ModeInfo, MAX_LIMITED_HANDLES};
pub use gate::CapabilityGate;
pub use policy::{
    parse_policies, PolicyFlags, PolicyRule, PolicySource, Rule, SecurityPolicy,
    StaticPolicySource, TomlPolicySource,
};
pub use rights::Rights;
