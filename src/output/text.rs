//! Human-readable text output

use crate::coordinator::RunSummary;
use crate::engine::EngineContext;
use crate::limiter::RateLimits;
use crate::perf;
use crate::util::time::{format_bytes, format_count, format_duration, format_rate, mib_per_second, per_second};
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

/// Everything the banner shows about a run
pub struct RunDescription<'a> {
    pub device: &'a Path,
    pub ctx: &'a EngineContext,
    pub time_limit: Option<Duration>,
    /// Hardware counter selector, if one was requested
    pub counter: Option<&'a str>,
}

/// Print the startup banner
pub fn print_banner(run: &RunDescription<'_>) {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z").to_string();
    print!("{}", format_banner(run, &host, &started));
}

/// Banner text, one "Label: value" line per item
pub fn format_banner(run: &RunDescription<'_>, host: &str, started: &str) -> String {
    let ctx = run.ctx;
    let features = &ctx.features;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "nvbench v{}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "  Host:         {}", host);
    let _ = writeln!(out, "  Started:      {}", started);
    let _ = writeln!(out);
    let _ = writeln!(out, "Device:");
    let _ = writeln!(out, "  Path:         {}", run.device.display());
    let _ = writeln!(out, "  Serial:       {}", or_unknown(&features.serial));
    let _ = writeln!(out, "  Model:        {}", or_unknown(&features.model));
    let _ = writeln!(
        out,
        "  Capacity:     {} blocks ({})",
        format_count(features.capacity_blocks),
        format_bytes(features.capacity_bytes())
    );
    let _ = writeln!(out, "  Block size:   {} bytes", features.block_size());
    let _ = writeln!(
        out,
        "  Max transfer: {} blocks ({})",
        format_count(features.max_transfer_blocks as u64),
        format_bytes(features.blocks_to_bytes(features.max_transfer_blocks as u64))
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Run:");
    let _ = writeln!(out, "  Pattern:      {}", ctx.pattern_description());
    let _ = writeln!(
        out,
        "  Buffer:       {} blocks ({})",
        format_count(ctx.buffer.blocks()),
        format_bytes(ctx.buffer.size_bytes() as u64)
    );
    let _ = writeln!(out, "  Workers:      {}", ctx.workers());
    let _ = writeln!(out, "  Submission:   {}", ctx.submit_mode);
    let _ = writeln!(out, "  Cache:        {}", ctx.cache_mode);
    let limits = ctx.limiter.as_ref().map(|limiter| limiter.limits());
    let _ = writeln!(out, "  Limits:       {}", describe_limits(limits));
    if let Some(limit) = run.time_limit {
        let _ = writeln!(out, "  Time limit:   {}", format_duration(limit));
    }
    if let Some(counter) = run.counter {
        let _ = writeln!(out, "  Counter:      {}", counter);
    }
    out
}

/// One-line description of the configured limits
pub fn describe_limits(limits: Option<&RateLimits>) -> String {
    let limits = match limits {
        Some(limits) if !limits.is_unlimited() => limits,
        _ => return "none".to_string(),
    };

    let mut parts = Vec::new();
    if let Some(blocks) = limits.local_blocks {
        parts.push(format!("{} blocks/s", format_count(blocks)));
    }
    if let Some(commands) = limits.local_commands {
        parts.push(format!("{} cmds/s", format_count(commands)));
    }
    if let Some(blocks) = limits.global_blocks {
        parts.push(format!("{} blocks total", format_count(blocks)));
    }
    if let Some(commands) = limits.global_commands {
        parts.push(format!("{} cmds total", format_count(commands)));
    }

    let mut text = parts.join(", ");
    if limits.has_local() {
        let _ = write!(text, " (refilled {}x per second)", limits.resolution);
    }
    text
}

/// Print the end-of-run summary
pub fn print_summary(summary: &RunSummary, block_shift: u32) {
    println!();
    print!("{}", format_summary(summary, block_shift));
}

pub fn format_summary(summary: &RunSummary, block_shift: u32) -> String {
    let totals = summary.totals;
    let elapsed = summary.elapsed;
    let mut out = String::new();

    let _ = writeln!(out, "Summary ({}):", summary.reason);
    let _ = writeln!(out, "  Elapsed:      {}", format_duration(elapsed));
    let _ = writeln!(
        out,
        "  Blocks:       {} ({})",
        format_count(totals.blocks),
        format_bytes(totals.blocks << block_shift)
    );
    let _ = writeln!(out, "  Commands:     {}", format_count(totals.commands));
    let _ = writeln!(
        out,
        "  Average:      {} blocks/s, {:.2} MiB/s, {} cmds/s",
        format_rate(per_second(totals.blocks, elapsed)),
        mib_per_second(totals.blocks, block_shift, elapsed),
        format_rate(per_second(totals.commands, elapsed))
    );
    if let Some((name, total)) = &summary.counter {
        let _ = writeln!(out, "  {}", perf::format_total(name, *total, elapsed));
    }
    out
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "(unknown)"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheMode;
    use crate::coordinator::StopReason;
    use crate::device::FeatureDescriptor;
    use crate::engine::mock::MockDevice;
    use crate::engine::SubmitMode;
    use crate::pattern;
    use crate::stats::CounterSample;
    use std::sync::Arc;

    fn context(limits: RateLimits) -> EngineContext {
        let features = FeatureDescriptor::new("S123", "ACME NVMe", 2 * 1024 * 1024, 9, 256);
        let device = Arc::new(MockDevice::new(features.clone()));
        EngineContext::new(features, device, pattern::create("single").unwrap(), 4)
            .unwrap()
            .with_limits(limits)
            .unwrap()
            .with_cache_mode(CacheMode::Always)
            .with_submit_mode(SubmitMode::Batched { capacity: 1000 })
    }

    #[test]
    fn test_banner_lists_device_and_run() {
        let ctx = context(RateLimits::default());
        let run = RunDescription {
            device: Path::new("/dev/nvme0n1"),
            ctx: &ctx,
            time_limit: Some(Duration::from_secs(30)),
            counter: Some("cache-misses"),
        };
        let text = format_banner(&run, "bench01", "2024-01-01 00:00:00 +0000");

        assert!(text.contains("Host:         bench01"));
        assert!(text.contains("Path:         /dev/nvme0n1"));
        assert!(text.contains("Serial:       S123"));
        assert!(text.contains("Model:        ACME NVMe"));
        assert!(text.contains("Capacity:     2,097,152 blocks (1.00 GiB)"));
        assert!(text.contains("Block size:   512 bytes"));
        assert!(text.contains("Max transfer: 256 blocks (128.00 KiB)"));
        assert!(text.contains("Buffer:       31 blocks (15.50 KiB)"));
        assert!(text.contains("Workers:      4"));
        assert!(text.contains("Submission:   batched (1000 commands per call)"));
        assert!(text.contains("Cache:        always"));
        assert!(text.contains("Limits:       none"));
        assert!(text.contains("Time limit:   30.00s"));
        assert!(text.contains("Counter:      cache-misses"));
    }

    #[test]
    fn test_banner_empty_identity() {
        let features = FeatureDescriptor::new("", "", 1024, 12, 8);
        let device = Arc::new(MockDevice::new(features.clone()));
        let ctx = EngineContext::new(features, device, pattern::create("flush").unwrap(), 1).unwrap();
        let run = RunDescription {
            device: Path::new("/dev/nvme1n1"),
            ctx: &ctx,
            time_limit: None,
            counter: None,
        };
        let text = format_banner(&run, "h", "t");
        assert!(text.contains("Serial:       (unknown)"));
        assert!(text.contains("Submission:   direct"));
        assert!(!text.contains("Time limit"));
    }

    #[test]
    fn test_describe_limits() {
        assert_eq!(describe_limits(None), "none");
        let limits = RateLimits {
            local_blocks: Some(100_000),
            global_commands: Some(5_000),
            resolution: 10,
            ..RateLimits::default()
        };
        assert_eq!(
            describe_limits(Some(&limits)),
            "100,000 blocks/s, 5,000 cmds total (refilled 10x per second)"
        );
        let global = RateLimits {
            global_blocks: Some(1_000),
            ..RateLimits::default()
        };
        assert_eq!(describe_limits(Some(&global)), "1,000 blocks total");
    }

    #[test]
    fn test_summary() {
        let summary = RunSummary {
            reason: StopReason::TimeLimit,
            elapsed: Duration::from_secs(2),
            totals: CounterSample { blocks: 4096, commands: 2000 },
            counter: Some(("cache-misses".to_string(), 1000)),
        };
        let text = format_summary(&summary, 9);
        assert!(text.starts_with("Summary (time limit reached):"));
        assert!(text.contains("Elapsed:      2.00s"));
        assert!(text.contains("Blocks:       4,096 (2.00 MiB)"));
        assert!(text.contains("Commands:     2,000"));
        assert!(text.contains("Average:      2.05K blocks/s, 1.00 MiB/s, 1.00K cmds/s"));
        assert!(text.contains("cache-misses: 1000 over 2.00s (500 per second)"));
    }
}
