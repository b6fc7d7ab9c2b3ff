//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::config::cli_convert::{parse_count, parse_duration};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Positionals
    if let Some(device) = &cli.device {
        config.device = Some(device.clone());
    }
    if let Some(pattern) = &cli.pattern {
        config.pattern = Some(pattern.clone());
        // Arguments belong to the pattern they were given with
        config.pattern_args = cli.pattern_args.clone();
    }

    // Workers
    if let Some(threads) = cli.threads {
        config.workers.threads = threads;
    }

    // Limits
    if let Some(rate) = &cli.block_rate {
        config.limits.block_rate = parse_count(rate).context("Invalid --block-rate")?;
    }
    if let Some(rate) = &cli.command_rate {
        config.limits.command_rate = parse_count(rate).context("Invalid --command-rate")?;
    }
    if let Some(resolution) = cli.resolution {
        config.limits.resolution = resolution;
    }
    if let Some(total) = &cli.total_blocks {
        config.limits.total_blocks = parse_count(total).context("Invalid --total-blocks")?;
    }
    if let Some(total) = &cli.total_commands {
        config.limits.total_commands = parse_count(total).context("Invalid --total-commands")?;
    }

    // Runtime
    if let Some(limit) = &cli.time_limit {
        config.runtime.time_limit = Some(parse_duration(limit).context("Invalid --time-limit")?);
    }
    if let Some(interval) = &cli.report_interval {
        config.runtime.report_interval =
            parse_duration(interval).context("Invalid --report-interval")?;
    }
    if let Some(cache) = cli.cache {
        config.runtime.cache = cache;
    }
    if cli.no_batch {
        config.runtime.batch = false;
    }
    if let Some(size) = cli.batch_size {
        config.runtime.batch_size = size;
    }
    if let Some(counter) = &cli.perf {
        config.runtime.counter = Some(counter.clone());
    }
    config.runtime.dry_run |= cli.dry_run;
    config.runtime.debug |= cli.debug;

    Ok(config)
}
