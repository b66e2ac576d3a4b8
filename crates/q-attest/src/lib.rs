// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-ATTEST for Qbitel TrustCore
//!
//! Boot and runtime integrity anchored in a hardware root of trust:
//!
//! - **Measurement**: one-way accumulation, `new = H(old || digest)`
//! - **Log**: bounded, signed entries with an integrity hash over all of them
//! - **Boot chain**: verify every link, then commit all or nothing
//! - **Evidence**: nonce-bound, signed attestation reports

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod anchor;
pub mod chain;
pub mod evidence;
pub mod log;
pub mod measurement;

pub use anchor::{AnchorState, TrustAnchor};
pub use chain::{BootChain, ChainLink, CHAIN_VERSION};
pub use evidence::{AttestationReport, NONCE_SIZE};
pub use log::{MeasurementLog, MAX_MEASUREMENTS};
pub use measurement::{Measurement, Register, REGISTER_COUNT};
