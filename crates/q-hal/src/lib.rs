// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hardware Abstraction Layer for Qbitel TrustCore
//!
//! This crate defines the hardware collaborators consumed by the trust core
//! and provides implementations for supported targets:
//!
//! - **Root of trust**: one-way accumulator registers and an entropy source
//! - **MMU control**: page permissions, translation invalidation, cache policy
//! - **Protection features**: NX, SMEP, SMAP, PKU and CET, decoded per platform
//!
//! # Architecture
//!
//! 1. **Traits**: Platform-agnostic interfaces (`traits` module)
//! 2. **Decoders**: Per-platform feature detection (`caps` module)
//! 3. **Simulation**: Software models for hosts and tests (`sim` module)
//!
//! # Security
//!
//! - Registers are never directly writable through any trait in this crate
//! - Raw CPU feature bit layouts stay behind [`HardwareCapabilities`]

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod caps;
pub mod error;
pub mod sim;
pub mod traits;
pub mod types;

// Re-export main traits
pub use error::{HalError, HalResult};
pub use traits::*;
pub use types::*;
