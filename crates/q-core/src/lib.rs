// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-CORE for Qbitel TrustCore
//!
//! Owns one instance of every security component and wires them to a
//! [`Platform`]:
//!
//! - **Attestation**: [`q_attest::TrustAnchor`]
//! - **Protection**: [`q_protect::ProtectionTable`]
//! - **Gating**: [`q_gate::CapabilityGate`]
//! - **Audit**: [`q_audit::AuditLedger`], shared by the other three
//!
//! There is no global state. Each [`SecurityCore`] is independent, and its
//! [`CoreStatus`] maps onto the process exit codes in
//! [`q_common::ExitCode`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod platform;
pub mod status;

pub use engine::{SecurityCore, ShutdownReport};
pub use platform::Platform;
pub use status::{boot_outcome, BootOutcome, CoreStatus, Health};
