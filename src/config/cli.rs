//! CLI argument parsing using clap

use super::CacheMode;
use clap::Parser;
use std::path::PathBuf;

/// nvbench - NVMe block-storage throughput benchmark
///
/// Everything after the pattern name is passed to the pattern; run
/// `nvbench --list-patterns` to see what is available.
#[derive(Parser, Debug)]
#[command(name = "nvbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// NVMe device (e.g. /dev/nvme0n1)
    #[arg(value_name = "DEVICE")]
    pub device: Option<PathBuf>,

    /// Command pattern
    #[arg(value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Arguments for the pattern (e.g. -b 1000 -o write)
    #[arg(value_name = "PATTERN_ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub pattern_args: Vec<String>,

    /// TOML configuration file (command-line values take precedence)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    // === Engine Options ===
    /// Number of worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Buffer cache priming
    #[arg(short = 'c', long, value_enum)]
    pub cache: Option<CacheMode>,

    /// Disable batched submission even if the driver supports it
    #[arg(long)]
    pub no_batch: bool,

    /// Commands per batched submission
    #[arg(long)]
    pub batch_size: Option<usize>,

    // === Limit Options ===
    /// Blocks per second (e.g. 100k; 0 = unlimited)
    #[arg(short = 'r', long)]
    pub block_rate: Option<String>,

    /// Commands per second (e.g. 10k; 0 = unlimited)
    #[arg(short = 'R', long)]
    pub command_rate: Option<String>,

    /// Rate budget refills per second
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Stop after this long (e.g. 30s, 5m; 0 = unlimited)
    #[arg(short = 'T', long)]
    pub time_limit: Option<String>,

    /// Stop after this many blocks (0 = unlimited)
    #[arg(short = 'B', long)]
    pub total_blocks: Option<String>,

    /// Stop after this many commands (0 = unlimited)
    #[arg(short = 'N', long)]
    pub total_commands: Option<String>,

    // === Output Options ===
    /// Hardware counter to report (perf event name, e.g. cache-misses)
    #[arg(short = 'p', long, value_name = "COUNTER")]
    pub perf: Option<String>,

    /// Live report interval (e.g. 1s, 500ms)
    #[arg(long)]
    pub report_interval: Option<String>,

    /// List the available patterns and exit
    #[arg(long)]
    pub list_patterns: bool,

    /// Print the run setup and exit before any I/O
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}
