// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fission_config::{load_config, validate_config};
use fission_engine::{LogReporter, Supervisor, ThreadLauncher};
use fission_observability::{debug_flags_help, init_logging, parse_debug_flags, LogFormat, LoggingConfig};
use tracing::{error, info};

/// Exit status for configuration and resource failures
const EXIT_FAILURE: i32 = 4;

/// Fission population simulator
#[derive(Parser, Debug)]
#[command(name = "fission-sim", version, about, long_about = None, after_help = debug_flags_help())]
struct Args {
    /// Parameter file (default: $FISSION_CONFIG_PATH, then ./conf/config.txt)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the throttle controller (Ctrl+C toggles it while running)
    #[arg(long, default_value_t = false)]
    throttle: bool,

    /// Override a parameter, e.g. --set ENERGY_DEMAND=300 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Base log level for crates without a debug flag
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit console logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Also write per-run log files under this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn parse_overrides(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut overrides = HashMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("override '{}' is not KEY=VALUE", pair);
        };
        overrides.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(overrides)
}

fn run() -> Result<i32> {
    let debug_flags = parse_debug_flags();
    let args = Args::parse_from(std::env::args().filter(|arg| !arg.starts_with("--debug-")));

    let logging = LoggingConfig {
        level: args.log_level.clone(),
        format: if args.json_logs { LogFormat::Json } else { LogFormat::Text },
        log_dir: args.log_dir.clone(),
        ..LoggingConfig::default()
    };
    let log_guard = init_logging(&debug_flags, &logging)?;
    if debug_flags.any_enabled() {
        info!("Debug logging: {}", debug_flags.to_filter_string(&logging.level));
    }
    if let Some(dir) = log_guard.log_dir() {
        info!("Writing run logs to {}", dir.display());
    }

    let mut overrides = parse_overrides(&args.overrides)?;
    if args.throttle {
        overrides.insert("THROTTLE".to_string(), "1".to_string());
    }

    let params = load_config(args.config.as_deref(), Some(&overrides))
        .context("Failed to load simulation parameters")?;
    validate_config(&params).context("Invalid simulation parameters")?;
    info!("Loaded parameters: {:?}", params);

    let supervisor = Supervisor::new(params, Arc::new(ThreadLauncher), Box::new(LogReporter));

    let kernel = supervisor.kernel();
    ctrlc::set_handler(move || {
        if kernel.state().throttle_enabled() {
            kernel.state().toggle_throttle();
        } else {
            info!("Throttle controller not running (start with --throttle)");
        }
    })?;
    if args.throttle {
        info!("Press Ctrl+C to toggle the throttle controller");
    }

    let outcome = supervisor.run()?;
    Ok(outcome.cause.exit_code())
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("fission-sim: {:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
