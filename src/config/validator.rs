//! Configuration validation

use super::*;
use crate::pattern;
use crate::perf::CounterSelector;
use anyhow::{Context, Result};

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_target(config)?;
    validate_workers(&config.workers)?;
    validate_limits(&config.limits)?;
    validate_runtime(&config.runtime)?;
    Ok(())
}

/// Device and pattern must be given, and the pattern must exist
pub fn validate_target(config: &Config) -> Result<()> {
    if config.device.is_none() {
        anyhow::bail!("No device given (usage: nvbench [OPTIONS] <DEVICE> <PATTERN> [PATTERN_ARGS]...)");
    }
    match config.pattern.as_deref() {
        None => anyhow::bail!("No pattern given (see --list-patterns)"),
        Some(name) if !pattern::is_registered(name) => anyhow::bail!(
            "Unknown pattern '{}' (available: {})",
            name,
            pattern::NAMES.join(", ")
        ),
        Some(_) => Ok(()),
    }
}

/// Validate worker configuration
pub fn validate_workers(workers: &WorkerConfig) -> Result<()> {
    if workers.threads == 0 {
        anyhow::bail!("threads must be at least 1");
    }

    let cpus = num_cpus::get();
    if workers.threads > cpus {
        eprintln!(
            "Warning: {} worker threads on {} CPUs; workers will compete for cores",
            workers.threads, cpus
        );
    }

    Ok(())
}

/// Validate rate limits
pub fn validate_limits(limits: &LimitConfig) -> Result<()> {
    if limits.resolution == 0 {
        anyhow::bail!("resolution must be at least 1");
    }

    let local = [("block_rate", limits.block_rate), ("command_rate", limits.command_rate)];
    for (name, rate) in local {
        if let Some(rate) = rate.filter(|&r| r > 0) {
            if rate < limits.resolution as u64 {
                anyhow::bail!(
                    "{} ({}) must be at least the resolution ({}) so every refill grants budget",
                    name,
                    rate,
                    limits.resolution
                );
            }
        }
    }

    Ok(())
}

/// Validate runtime configuration
pub fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    if runtime.batch_size == 0 {
        anyhow::bail!("batch_size must be at least 1");
    }

    if runtime.report_interval.is_zero() {
        anyhow::bail!("report_interval must be greater than 0");
    }

    if let Some(counter) = &runtime.counter {
        counter
            .parse::<CounterSelector>()
            .context("Invalid hardware counter")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            device: Some(PathBuf::from("/dev/nvme0n1")),
            pattern: Some("full".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_device_or_pattern() {
        let mut config = valid();
        config.device = None;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.pattern = None;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.pattern = Some("zigzag".to_string());
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("zigzag"));
    }

    #[test]
    fn test_zero_threads() {
        let mut config = valid();
        config.workers.threads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_limits_must_cover_resolution() {
        let mut config = valid();
        config.limits.resolution = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.limits.resolution = 100;
        config.limits.command_rate = Some(50);
        assert!(validate_config(&config).is_err());

        config.limits.command_rate = Some(100);
        assert!(validate_config(&config).is_ok());

        // 0 is unlimited and never checked against the resolution
        config.limits.block_rate = Some(0);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_runtime_checks() {
        let mut config = valid();
        config.runtime.batch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.runtime.report_interval = Duration::ZERO;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.runtime.counter = Some("cache-often".to_string());
        assert!(validate_config(&config).is_err());

        config.runtime.counter = Some("cache-misses".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
