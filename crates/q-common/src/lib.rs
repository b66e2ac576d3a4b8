// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel TrustCore Common Library
//!
//! This crate provides the error taxonomy, configuration structures, logging
//! setup and time sources shared by all Qbitel TrustCore components.
//!
//! # Security
//!
//! Errors are `Copy` and carry no payload, so an error can never leak
//! measurement data or key material through its message.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod errors;
pub mod log;
pub mod time;

// Re-export commonly used items
pub use config::CoreConfig;
pub use errors::{Error, ExitCode, Result};
pub use time::{Clock, Timestamp};
