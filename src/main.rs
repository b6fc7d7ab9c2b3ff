//! nvbench CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use nvbench::config::{cli::Cli, cli_convert, validator, Config};
use nvbench::coordinator::{self, RunOptions, StopReason};
use nvbench::device::DeviceBackend;
use nvbench::engine::{EngineContext, SubmitMode};
use nvbench::output::text::{self, RunDescription};
use nvbench::pattern;
use nvbench::perf::{self, CounterSelector, CounterTracker};
use nvbench::stats::live::LiveReporter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_patterns {
        print_patterns();
        return Ok(());
    }

    let config = cli_convert::cli_to_config(&cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;

    run(&config)
}

fn print_patterns() {
    println!("Available patterns:");
    for (name, description) in pattern::available() {
        println!("  {:<8} {}", name, description);
    }
}

fn run(config: &Config) -> Result<()> {
    let debug = config.runtime.debug;
    let device_path = config.device.as_deref().context("No device given")?;
    let pattern_name = config.pattern.as_deref().context("No pattern given")?;

    let mut pattern = pattern::create(pattern_name)?;
    pattern
        .configure(&config.pattern_args)
        .with_context(|| format!("Invalid arguments for pattern '{}'", pattern_name))?;

    let device = open_device(device_path)?;
    let features = device
        .identify()
        .with_context(|| format!("Failed to identify {}", device_path.display()))?;
    if debug {
        eprintln!("DEBUG: {:?}", features);
    }

    let submit_mode = SubmitMode::select(
        device.as_ref(),
        config.runtime.batch,
        config.runtime.batch_size,
    );
    if debug {
        eprintln!(
            "DEBUG: Batched submission {} by the driver; using {} mode",
            if device.supports_batch() { "supported" } else { "not supported" },
            submit_mode
        );
    }

    let ctx = EngineContext::new(features, device, pattern, config.workers.threads)?
        .with_limits(config.rate_limits())?
        .with_cache_mode(config.runtime.cache)
        .with_submit_mode(submit_mode)
        .with_debug(debug);
    if ctx.buffer.blocks() > ctx.features.capacity_blocks {
        eprintln!(
            "Warning: pattern buffer ({} blocks) is larger than the device ({} blocks)",
            ctx.buffer.blocks(),
            ctx.features.capacity_blocks
        );
    }

    let block_shift = ctx.features.lba_shift;
    let mut reporter = LiveReporter::new(block_shift, true);
    if let Some(counter) = &config.runtime.counter {
        let selector: CounterSelector = counter.parse()?;
        let source = perf::open(&selector)?;
        reporter = reporter.with_counter(CounterTracker::new(source));
    }

    text::print_banner(&RunDescription {
        device: device_path,
        ctx: &ctx,
        time_limit: config.time_limit(),
        counter: config.runtime.counter.as_deref(),
    });

    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated, no I/O issued");
        return Ok(());
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let interrupt = Arc::clone(&interrupt);
        move || {
            if interrupt.swap(true, Ordering::Relaxed) {
                eprintln!("Received second interrupt, exiting");
                std::process::exit(0);
            }
        }
    })
    .context("Failed to install interrupt handler")?;

    println!();
    let options = RunOptions {
        time_limit: config.time_limit(),
        report_interval: config.runtime.report_interval,
        ..RunOptions::default()
    };
    let summary = coordinator::run(Arc::new(ctx), &options, &mut reporter, &interrupt)?;

    text::print_summary(&summary, block_shift);
    if summary.reason == StopReason::Interrupted && debug {
        eprintln!("DEBUG: Interrupted; workers are not drained");
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_device(path: &Path) -> Result<Arc<dyn DeviceBackend>> {
    let device = nvbench::device::nvme::NvmeDevice::open(path)?;
    Ok(Arc::new(device))
}

#[cfg(not(target_os = "linux"))]
fn open_device(path: &Path) -> Result<Arc<dyn DeviceBackend>> {
    anyhow::bail!(
        "Cannot open {}: NVMe passthrough is only supported on Linux",
        path.display()
    )
}
