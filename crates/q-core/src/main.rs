// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! `trustctl` administration tool
//!
//! Boots a security core on the simulated platform and reports on it.
//! Exit codes follow [`q_common::ExitCode`]: 0 healthy, 1 degraded,
//! 2 fatal or recovery required.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use q_audit::FileSink;
use q_common::log;
use q_common::{CoreConfig, Error, Result};
use q_core::{boot_outcome, BootOutcome, Platform, SecurityCore};
use q_gate::TomlPolicySource;

/// Seed for the simulated platform identity
const SIM_SEED: [u8; 32] = *b"qbitel-trustcore-simulated-seed!";

/// Qbitel TrustCore administration
#[derive(Parser)]
#[command(name = "trustctl", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Command {
    /// Boot a core and print its status.
    Status {
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
        /// Append audit records to this file.
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
    /// Load a policy file and print how many policies it holds.
    ReloadPolicies {
        /// TOML policy file.
        #[arg(long)]
        policies: PathBuf,
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Status {
            config,
            json,
            audit_log,
        } => handle_status(config.as_deref(), json, audit_log.as_deref()),
        Command::ReloadPolicies { policies, config } => {
            handle_reload(&policies, config.as_deref())
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(2))
}

/// Load the configuration and install logging from it.
fn load_config(path: Option<&Path>) -> Result<CoreConfig> {
    let config = match path {
        Some(path) => CoreConfig::load(path).map_err(|e| {
            eprintln!("trustctl: {}: {e}", path.display());
            Error::from(e)
        })?,
        None => CoreConfig::DEFAULT,
    };
    log::init(&config.log);
    Ok(config)
}

/// Report a failed run and pick its exit code.
fn fail<T>(result: &Result<T>) -> i32 {
    let outcome = boot_outcome(result);
    match outcome {
        BootOutcome::Healthy => {}
        BootOutcome::Degraded(e) => eprintln!("trustctl: {e}"),
        BootOutcome::RecoveryRequired(e) => eprintln!("trustctl: {e}; recovery required"),
    }
    outcome.exit_code()
}

fn handle_status(config: Option<&Path>, json: bool, audit_log: Option<&Path>) -> i32 {
    let booted = load_config(config).and_then(|config| {
        let mut platform = Platform::simulated(SIM_SEED);
        if let Some(path) = audit_log {
            platform = platform.with_sink(Arc::new(FileSink::open(path)?));
        }
        SecurityCore::init(config, platform)
    });
    let core = match booted {
        Ok(core) => core,
        Err(e) => return fail(&Err::<(), _>(e)),
    };

    let status = match core.status() {
        Ok(status) => status,
        Err(e) => return fail(&Err::<(), _>(e)),
    };
    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("trustctl: failed to encode status: {e}");
                return q_common::ExitCode::DEGRADED;
            }
        }
    } else {
        println!("{status}");
    }

    if let Err(e) = core.shutdown() {
        tracing::warn!(error = %e, "shutdown incomplete");
    }
    status.health.exit_code()
}

fn handle_reload(policies: &Path, config: Option<&Path>) -> i32 {
    let result = load_config(config).and_then(|config| {
        let platform = Platform::simulated(SIM_SEED)
            .with_policy_source(Arc::new(TomlPolicySource::new(policies)));
        let core = SecurityCore::init(config, platform)?;
        let count = core.reload_policies()?;
        core.shutdown()?;
        Ok(count)
    });
    match result {
        Ok(count) => {
            println!("{count} policies loaded from {}", policies.display());
            q_common::ExitCode::HEALTHY
        }
        Err(_) => fail(&result),
    }
}
