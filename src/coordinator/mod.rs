//! Coordinator module
//!
//! Runs one benchmark on the calling thread: starts the refill thread and the
//! worker pool, ticks the live reporter once per report interval and decides
//! when the run is over.
//!
//! A run ends on the first of:
//!
//! - a worker exhausting a global block or command limit,
//! - the time limit,
//! - the interrupt flag (set from the signal handler),
//! - every worker having exited.
//!
//! The first worker failure ends the run with that worker's error.
//!
//! After an orderly stop the coordinator waits a short grace period for the
//! workers to submit their partial batches. Workers that are still busy after
//! that (a `noop` pattern parks forever) are left running and end with the
//! process. After an interrupt nothing is waited for.

use crate::engine::EngineContext;
use crate::stats::live::LiveReporter;
use crate::stats::CounterSample;
use crate::worker::{WorkerEvent, WorkerExit, WorkerPool};
use crate::Result;
use anyhow::Context;
use crossbeam::channel::RecvTimeoutError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest the coordinator sleeps before checking the interrupt flag again
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run options that are not part of the engine context
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock limit
    pub time_limit: Option<Duration>,

    /// Live report interval
    pub report_interval: Duration,

    /// How long to wait for workers after an orderly stop
    pub shutdown_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            report_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    GlobalLimit,
    TimeLimit,
    Interrupted,
    WorkersExited,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::GlobalLimit => write!(f, "global limit reached"),
            StopReason::TimeLimit => write!(f, "time limit reached"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::WorkersExited => write!(f, "all workers exited"),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub totals: CounterSample,

    /// Hardware counter name and total, if one was attached
    pub counter: Option<(String, u64)>,
}

/// Run the benchmark until it stops
///
/// `interrupt` is polled at least every 50ms.
pub fn run(
    ctx: Arc<EngineContext>,
    options: &RunOptions,
    reporter: &mut LiveReporter,
    interrupt: &AtomicBool,
) -> Result<RunSummary> {
    if let Some(limiter) = &ctx.limiter {
        if limiter.spawn_refill()?.is_some() && ctx.debug {
            eprintln!(
                "DEBUG: Refill thread started ({} refills every {:?})",
                limiter.limits().resolution,
                limiter.limits().interval
            );
        }
    }

    let pool = WorkerPool::spawn(&ctx)?;

    let result = supervise(&ctx, &pool, options, reporter, interrupt);
    ctx.request_stop();
    let (reason, elapsed) = result?;

    if reason != StopReason::Interrupted {
        wait_for_workers(&ctx, pool, options.shutdown_grace, reason)?;
    }

    reporter.finish(ctx.counters.drain())?;

    Ok(RunSummary {
        reason,
        elapsed,
        totals: reporter.totals(),
        counter: reporter.counter_total(),
    })
}

/// Main loop: report, watch the limits, collect worker events
fn supervise(
    ctx: &EngineContext,
    pool: &WorkerPool,
    options: &RunOptions,
    reporter: &mut LiveReporter,
    interrupt: &AtomicBool,
) -> Result<(StopReason, Duration)> {
    reporter.start()?;

    let started = Instant::now();
    let deadline = options.time_limit.map(|limit| started + limit);
    let mut next_report = started + options.report_interval;
    let mut exited = 0;

    let reason = loop {
        if interrupt.load(Ordering::Relaxed) {
            break StopReason::Interrupted;
        }

        let now = Instant::now();
        if deadline.map_or(false, |deadline| now >= deadline) {
            break StopReason::TimeLimit;
        }
        if now >= next_report {
            reporter.tick(ctx.counters.drain())?;
            next_report += options.report_interval;
            if next_report <= now {
                // Fell behind; don't print a burst of catch-up lines
                next_report = now + options.report_interval;
            }
        }

        let mut wait = POLL_INTERVAL.min(next_report.saturating_duration_since(now));
        if let Some(deadline) = deadline {
            wait = wait.min(deadline.saturating_duration_since(now));
        }

        match pool.events().recv_timeout(wait) {
            Ok(WorkerEvent::Exited { exit: WorkerExit::GlobalLimit, .. }) => {
                break StopReason::GlobalLimit;
            }
            Ok(WorkerEvent::Exited { exit: WorkerExit::Stopped, .. }) => {
                exited += 1;
                if exited == pool.len() {
                    break StopReason::WorkersExited;
                }
            }
            Ok(WorkerEvent::Failed { id, error }) => {
                return Err(error.context(format!("Worker {} failed", id)));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break StopReason::WorkersExited,
        }
    };

    Ok((reason, started.elapsed()))
}

/// Give stopped workers `grace` to drain their batches
///
/// A failure reported during the grace period is still an error of the run.
fn wait_for_workers(
    ctx: &EngineContext,
    pool: WorkerPool,
    grace: Duration,
    reason: StopReason,
) -> Result<()> {
    let deadline = Instant::now() + grace;
    // A global-limit stop was announced by one exited worker
    let mut remaining = pool.len() - usize::from(reason == StopReason::GlobalLimit);
    if reason == StopReason::WorkersExited {
        remaining = 0;
    }

    while remaining > 0 {
        let wait = deadline.saturating_duration_since(Instant::now());
        match pool.events().recv_timeout(wait) {
            Ok(WorkerEvent::Exited { .. }) => remaining -= 1,
            Ok(WorkerEvent::Failed { id, error }) => {
                return Err(error.context(format!("Worker {} failed", id)));
            }
            Err(RecvTimeoutError::Disconnected) => remaining = 0,
            Err(RecvTimeoutError::Timeout) => {
                eprintln!(
                    "Warning: {} of {} workers still busy after {:?}; leaving them to exit with the process",
                    remaining,
                    pool.len(),
                    grace
                );
                return Ok(());
            }
        }
    }

    if ctx.debug {
        eprintln!("DEBUG: All {} workers exited", pool.len());
    }
    pool.join().context("Failed to join worker threads")
}
