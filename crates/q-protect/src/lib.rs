// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Q-PROTECT for Qbitel TrustCore
//!
//! Runtime memory protection tied to the trust state:
//!
//! - **Regions**: non-overlapping, bounded slot arena, integer handles
//! - **Enforcement**: MMU permissions, translation invalidation, cache policy
//! - **Access checks**: grant iff the requested flags are a subset
//! - **DMA**: device-address masks and optional post-transfer verification
//! - **Hardware features**: NX, SMEP, SMAP, PKU, CET where present

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dma;
pub mod flags;
pub mod region;
pub mod table;

pub use dma::{DmaGrant, DmaRequest};
pub use flags::RegionFlags;
pub use region::{RegionHandle, RegionInfo, RegionSpec};
pub use table::{ProtectionStats, ProtectionTable, UNMANAGED_FLAGS};
