// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parameter file loading with override support
//!
//! Three tiers, later tiers win:
//! 1. Parameter file (`key = value` lines)
//! 2. Environment variables (`FISSION_<KEY>`)
//! 3. CLI arguments (`--set KEY=VALUE`)

use crate::{ConfigError, ConfigResult, SimulationParams};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory and file name searched for when no path is given
pub const CONFIG_DIR: &str = "conf";
pub const CONFIG_FILE_NAME: &str = "config.txt";

/// Environment variable naming an explicit parameter file
pub const CONFIG_PATH_ENV: &str = "FISSION_CONFIG_PATH";

/// Prefix for per-key environment overrides
pub const ENV_PREFIX: &str = "FISSION_";

/// Keys accepted by [`set_param`], canonical names first
const KNOWN_KEYS: &[&str] = &[
    "ENERGY_DEMAND",
    "N_INITIAL_WORKERS",
    "MAX_SIZE",
    "MIN_VIABLE_SIZE",
    "N_NEW_PER_TICK",
    "SIM_DURATION",
    "EXPLODE_THRESHOLD",
    "STEP_INTERVAL",
    "MAX_ACTIVE_WORKERS",
    "RATE_INTERVAL_MS",
    "TICK_INTERVAL_MS",
    "COUNTDOWN_SECS",
    "SHUTDOWN_TIMEOUT_MS",
    "SEED",
    "THROTTLE",
];

/// Find the parameter file
///
/// Search order:
/// 1. `FISSION_CONFIG_PATH` environment variable
/// 2. `./conf/config.txt`
/// 3. `conf/config.txt` in up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_DIR).join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_DIR).join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "parameter file '{}/{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_DIR, CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Drop a trailing `//` comment and surrounding whitespace
fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
    .trim()
}

/// Parse parameter file contents
///
/// Each line is split on its first `=`. Known keys go through [`set_param`],
/// so a key given twice (or under both its historical and descriptive name)
/// takes the value of the later line. Lines without `=` and unknown keys are
/// skipped.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if a known key carries a value that
/// does not parse, naming the offending line
pub fn parse_params(content: &str) -> ConfigResult<SimulationParams> {
    let mut params = SimulationParams::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = strip_comment(raw);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match set_param(&mut params, key.trim(), value.trim()) {
            Ok(()) | Err(ConfigError::UnknownKey(_)) => {}
            Err(e) => return Err(ConfigError::ParseError(format!("line {}: {}", idx + 1, e))),
        }
    }

    Ok(params)
}

/// Load parameters from a file, then apply environment and CLI overrides
///
/// # Arguments
///
/// * `config_path` - Optional path to the file. If `None`, [`find_config_file`] is used.
/// * `cli_args` - Optional `KEY -> VALUE` overrides
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable, a known key in it
/// has an unparsable value, or a CLI
/// override names an unknown key or carries an unparsable value
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SimulationParams> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut params = parse_params(&content)?;

    apply_environment_overrides(&mut params);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut params, cli)?;
    }

    Ok(params)
}

/// Apply environment variable overrides
///
/// Every key accepted by [`set_param`] can be overridden with
/// `FISSION_<KEY>`, e.g. `FISSION_ENERGY_DEMAND=300`. Unparsable values are
/// ignored, leaving the file value in place.
pub fn apply_environment_overrides(params: &mut SimulationParams) {
    for key in KNOWN_KEYS {
        if let Ok(value) = env::var(format!("{}{}", ENV_PREFIX, key)) {
            let _ = set_param(params, key, &value);
        }
    }
}

/// Apply CLI argument overrides
///
/// # Errors
///
/// Unlike environment overrides, a bad CLI override is reported
pub fn apply_cli_overrides(
    params: &mut SimulationParams,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for (key, value) in cli_args {
        set_param(params, key, value)?;
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = {}", key, value)))
}

/// Set a single parameter by key (case-insensitive, historical aliases accepted)
pub fn set_param(params: &mut SimulationParams, key: &str, value: &str) -> ConfigResult<()> {
    match key.trim().to_ascii_uppercase().as_str() {
        "ENERGY_DEMAND" => params.energy_demand = parse_value(key, value)?,
        "N_INITIAL_WORKERS" | "N_ATOMI_INIT" => params.n_initial_workers = parse_value(key, value)?,
        "MAX_SIZE" | "N_ATOM_MAX" => params.max_size = parse_value(key, value)?,
        "MIN_VIABLE_SIZE" | "MIN_N_ATOMICO" => params.min_viable_size = parse_value(key, value)?,
        "N_NEW_PER_TICK" | "N_NUOVI_ATOMI" => params.n_new_per_tick = parse_value(key, value)?,
        "SIM_DURATION" => params.sim_duration = parse_value(key, value)?,
        "EXPLODE_THRESHOLD" | "ENERGY_EXPLODE_THRESHOLD" => {
            params.explode_threshold = parse_value(key, value)?
        }
        "STEP_INTERVAL" | "STEP" => params.step_interval = parse_value(key, value)?,
        "MAX_ACTIVE_WORKERS" => params.max_active_workers = parse_value(key, value)?,
        "RATE_INTERVAL_MS" => params.rate_interval_ms = parse_value(key, value)?,
        "TICK_INTERVAL_MS" => params.tick_interval_ms = parse_value(key, value)?,
        "COUNTDOWN_SECS" => params.countdown_secs = parse_value(key, value)?,
        "SHUTDOWN_TIMEOUT_MS" => params.shutdown_timeout_ms = parse_value(key, value)?,
        "SEED" => params.seed = parse_value(key, value)?,
        "THROTTLE" => {
            params.throttle = match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => 1,
                "false" | "no" | "off" => 0,
                other => parse_value(key, other)?,
            }
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const SAMPLE: &str = "\
// Simulation parameters
ENERGY_DEMAND = 300
N_ATOMI_INIT = 20   // initial population

N_ATOM_MAX = 118
MIN_N_ATOMICO = 4
N_NUOVI_ATOMI = 5
SIM_DURATION = 60
ENERGY_EXPLODE_THRESHOLD = 100000
STEP = 1000000
";

    #[test]
    fn test_parse_historical_keys() {
        let params = parse_params(SAMPLE).unwrap();
        assert_eq!(params.energy_demand, 300);
        assert_eq!(params.n_initial_workers, 20);
        assert_eq!(params.max_size, 118);
        assert_eq!(params.min_viable_size, 4);
        assert_eq!(params.n_new_per_tick, 5);
        assert_eq!(params.sim_duration, 60);
        assert_eq!(params.explode_threshold, 100_000);
        assert_eq!(params.step_interval, 1_000_000);
    }

    #[test]
    fn test_missing_keys_default_to_zero() {
        let params = parse_params("ENERGY_DEMAND = 7").unwrap();
        assert_eq!(params.energy_demand, 7);
        assert_eq!(params.n_initial_workers, 0);
        assert_eq!(params.sim_duration, 0);
        assert_eq!(params.max_active_workers, 1000);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let params = parse_params("FOO = 3\nSIM_DURATION = 9").unwrap();
        assert_eq!(params.sim_duration, 9);
    }

    #[test]
    fn test_comment_only_file() {
        let params = parse_params("// nothing here\n\n   // still nothing\n").unwrap();
        assert_eq!(params, SimulationParams::default());
    }

    #[test]
    fn test_line_without_assignment_is_skipped() {
        let params = parse_params("ENERGY_DEMAND 300\nSIM_DURATION = 4").unwrap();
        assert_eq!(params.energy_demand, 0);
        assert_eq!(params.sim_duration, 4);
    }

    #[test]
    fn test_unknown_key_with_bare_word_value_ignored() {
        let params = parse_params("OPERATOR = alice\nSIM_DURATION = 9").unwrap();
        assert_eq!(params.sim_duration, 9);
    }

    #[test]
    fn test_repeated_key_last_line_wins() {
        let params = parse_params("SIM_DURATION = 9\nSIM_DURATION = 12").unwrap();
        assert_eq!(params.sim_duration, 12);
    }

    #[test]
    fn test_historical_and_descriptive_names_last_line_wins() {
        let params = parse_params("N_ATOMI_INIT = 3\nN_INITIAL_WORKERS = 4").unwrap();
        assert_eq!(params.n_initial_workers, 4);

        let params = parse_params("N_INITIAL_WORKERS = 4\nN_ATOMI_INIT = 3").unwrap();
        assert_eq!(params.n_initial_workers, 3);
    }

    #[test]
    fn test_file_accepts_plain_value_spellings() {
        let params = parse_params("THROTTLE = true\nSTEP = 0100\nSEED=5 // inline").unwrap();
        assert!(params.throttle_enabled());
        assert_eq!(params.step_interval, 100);
        assert_eq!(params.seed, 5);
    }

    #[test]
    fn test_bad_value_on_known_key_names_line() {
        let result = parse_params("// header\nSIM_DURATION = 9\nSTEP = soon");
        match result {
            Err(ConfigError::ParseError(msg)) => assert!(msg.starts_with("line 3:"), "{msg}"),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_set_param_aliases() {
        let mut params = SimulationParams::default();
        set_param(&mut params, "n_atom_max", "50").unwrap();
        set_param(&mut params, "MAX_ACTIVE_WORKERS", "12").unwrap();
        set_param(&mut params, "throttle", "yes").unwrap();
        assert_eq!(params.max_size, 50);
        assert_eq!(params.max_active_workers, 12);
        assert!(params.throttle_enabled());

        assert!(matches!(
            set_param(&mut params, "BOGUS", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            set_param(&mut params, "SEED", "-1"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.txt");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var(CONFIG_PATH_ENV, "/definitely/not/here/config.txt");
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut params = SimulationParams::default();

        env::set_var("FISSION_ENERGY_DEMAND", "450");
        env::set_var("FISSION_TICK_INTERVAL_MS", "not-a-number");
        apply_environment_overrides(&mut params);
        env::remove_var("FISSION_ENERGY_DEMAND");
        env::remove_var("FISSION_TICK_INTERVAL_MS");

        assert_eq!(params.energy_demand, 450);
        assert_eq!(params.tick_interval_ms, 1000);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.txt");

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "ENERGY_DEMAND = 100").unwrap();
        writeln!(file, "SIM_DURATION = 10").unwrap();

        env::set_var("FISSION_ENERGY_DEMAND", "200");
        env::set_var("FISSION_SIM_DURATION", "20");

        let mut cli_args = HashMap::new();
        cli_args.insert("ENERGY_DEMAND".to_string(), "300".to_string());

        let params = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("FISSION_ENERGY_DEMAND");
        env::remove_var("FISSION_SIM_DURATION");

        // CLI wins for demand, env wins for duration
        assert_eq!(params.energy_demand, 300);
        assert_eq!(params.sim_duration, 20);
    }
}
