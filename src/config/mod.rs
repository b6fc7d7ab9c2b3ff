//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! A run is described by one `Config`. It is loaded from an optional TOML file
//! and then overridden by whatever was given on the command line.
//!
//! ```toml
//! device = "/dev/nvme0n1"
//! pattern = "random"
//! pattern_args = ["-b", "65536", "--seed", "7"]
//!
//! [workers]
//! threads = 4
//!
//! [limits]
//! block_rate = 100000
//! resolution = 10
//! total_commands = 1000000
//!
//! [runtime]
//! time_limit = "30s"
//! cache = "once"
//! ```

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::engine::DEFAULT_BATCH_CAPACITY;
use crate::limiter::RateLimits;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// NVMe device path
    pub device: Option<PathBuf>,
    /// Registered pattern name
    pub pattern: Option<String>,
    /// Arguments handed to the pattern
    #[serde(default)]
    pub pattern_args: Vec<String>,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub limits: LimitConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_threads() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

/// Rate and total limits
///
/// Absent values mean unlimited.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    /// Blocks per second
    pub block_rate: Option<u64>,
    /// Commands per second
    pub command_rate: Option<u64>,
    /// Budget refills per second
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// Blocks for the whole run
    pub total_blocks: Option<u64>,
    /// Commands for the whole run
    pub total_commands: Option<u64>,
}

fn default_resolution() -> u32 {
    1
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            block_rate: None,
            command_rate: None,
            resolution: default_resolution(),
            total_blocks: None,
            total_commands: None,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Wall-clock limit ("30s", "5m", ...)
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub time_limit: Option<Duration>,
    /// Live report interval
    #[serde(default = "default_report_interval", deserialize_with = "deserialize_duration")]
    pub report_interval: Duration,
    /// Buffer cache priming
    #[serde(default)]
    pub cache: CacheMode,
    /// Use batched submission when the driver supports it
    #[serde(default = "default_batch")]
    pub batch: bool,
    /// Commands per batched submission
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Hardware counter selector (perf event name, e.g. `cache-misses`)
    pub counter: Option<String>,
    /// Dry run mode
    #[serde(default)]
    pub dry_run: bool,
    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

fn default_report_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_batch() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_CAPACITY
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            time_limit: None,
            report_interval: default_report_interval(),
            cache: CacheMode::default(),
            batch: default_batch(),
            batch_size: default_batch_size(),
            counter: None,
            dry_run: false,
            debug: false,
        }
    }
}

/// Buffer cache priming mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Leave the buffer alone
    #[default]
    None,
    /// Fill the whole buffer once before the run
    Once,
    /// Touch each command's buffer range right before submitting it
    Always,
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::None => write!(f, "none"),
            CacheMode::Once => write!(f, "once"),
            CacheMode::Always => write!(f, "always"),
        }
    }
}

impl Config {
    /// Limits in the form the rate limiter takes
    ///
    /// A configured value of 0 means unlimited.
    pub fn rate_limits(&self) -> RateLimits {
        let nonzero = |value: Option<u64>| value.filter(|&v| v > 0);
        RateLimits {
            local_blocks: nonzero(self.limits.block_rate),
            local_commands: nonzero(self.limits.command_rate),
            global_blocks: nonzero(self.limits.total_blocks),
            global_commands: nonzero(self.limits.total_commands),
            resolution: self.limits.resolution,
            interval: Duration::from_secs(1),
        }
    }

    /// Wall-clock limit, if any (0 means none)
    pub fn time_limit(&self) -> Option<Duration> {
        self.runtime.time_limit.filter(|limit| !limit.is_zero())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    cli_convert::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let text: Option<String> = Option::deserialize(deserializer)?;
    text.map(|t| cli_convert::parse_duration(&t).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers.threads, 1);
        assert_eq!(config.limits.resolution, 1);
        assert_eq!(config.runtime.report_interval, Duration::from_secs(1));
        assert_eq!(config.runtime.batch_size, DEFAULT_BATCH_CAPACITY);
        assert!(config.runtime.batch);
        assert_eq!(config.runtime.cache, CacheMode::None);
        assert!(config.rate_limits().is_unlimited());
        assert_eq!(config.time_limit(), None);
    }

    #[test]
    fn test_rate_limits_treat_zero_as_unlimited() {
        let mut config = Config::default();
        config.limits.block_rate = Some(0);
        config.limits.command_rate = Some(500);
        config.limits.total_blocks = Some(1000);
        config.limits.resolution = 5;

        let limits = config.rate_limits();
        assert_eq!(limits.local_blocks, None);
        assert_eq!(limits.local_commands, Some(500));
        assert_eq!(limits.global_blocks, Some(1000));
        assert_eq!(limits.global_commands, None);
        assert_eq!(limits.resolution, 5);
    }

    #[test]
    fn test_zero_time_limit_is_none() {
        let mut config = Config::default();
        config.runtime.time_limit = Some(Duration::ZERO);
        assert_eq!(config.time_limit(), None);
        config.runtime.time_limit = Some(Duration::from_secs(3));
        assert_eq!(config.time_limit(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_cache_mode_display() {
        assert_eq!(CacheMode::None.to_string(), "none");
        assert_eq!(CacheMode::Always.to_string(), "always");
    }
}
