//! CLI to Config conversion utilities

use crate::config::cli::Cli;
use crate::config::{toml, Config};
use anyhow::{Context, Result};
use std::time::Duration;

/// Parse a duration string (e.g. "60", "60s", "500ms", "5m", "1h")
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, Duration::from_millis(1))
    } else if let Some(num) = s.strip_suffix("sec").or_else(|| s.strip_suffix('s')) {
        (num, Duration::from_secs(1))
    } else if let Some(num) = s.strip_suffix("min").or_else(|| s.strip_suffix('m')) {
        (num, Duration::from_secs(60))
    } else if let Some(num) = s.strip_suffix("hr").or_else(|| s.strip_suffix('h')) {
        (num, Duration::from_secs(3600))
    } else {
        (s.as_str(), Duration::from_secs(1))
    };

    let num: u32 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    Ok(unit * num)
}

/// Parse a count with an optional decimal multiplier ("100", "10k", "2m", "1g")
///
/// Returns `None` for 0, which means unlimited.
pub fn parse_count(s: &str) -> Result<Option<u64>> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('k') {
        (num, 1_000u64)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 1_000_000)
    } else if let Some(num) = s.strip_suffix('g') {
        (num, 1_000_000_000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid count format: {}", s))?;
    let count = num
        .checked_mul(multiplier)
        .with_context(|| format!("Count out of range: {}", s))?;

    Ok(Some(count).filter(|&c| c > 0))
}

/// Build the run configuration from the command line
///
/// Loads the `--config` file if one was given, then applies the command-line
/// overrides.
pub fn cli_to_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => toml::parse_toml_file(path)?,
        None => Config::default(),
    };
    toml::merge_cli_with_config(cli, base)
}
