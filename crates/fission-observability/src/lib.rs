// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # fission-observability
//!
//! Logging infrastructure shared by the simulator crates, with per-crate
//! debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files in a timestamped run folder, with retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "fission-config",
    "fission-state",
    "fission-engine",
    "fission-sim",
];
