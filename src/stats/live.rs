//! Live throughput reporting
//!
//! The coordinator drains the pool counters once per reporting interval and
//! hands the sample to `LiveReporter::tick`, which turns it into one
//! throughput line (blocks/s, MiB/s, commands/s and the optional hardware
//! counter delta), prints it, and accumulates the run totals.
//!
//! # Example
//!
//! ```
//! use nvbench::stats::live::LiveReporter;
//! use nvbench::stats::CounterSample;
//!
//! let mut reporter = LiveReporter::new(12, false);
//! reporter.start()?;
//! let line = reporter.tick(CounterSample { blocks: 256, commands: 32 })?;
//! assert_eq!(line.sample.blocks, 256);
//! assert_eq!(reporter.totals().commands, 32);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::perf::CounterTracker;
use crate::stats::CounterSample;
use crate::util::time::{format_count, format_rate, mib_per_second, per_second};
use std::fmt;
use std::time::{Duration, Instant};

/// One reporting interval
#[derive(Debug, Clone)]
pub struct ThroughputLine {
    /// Time since the run started
    pub elapsed: Duration,

    /// Length of this interval
    pub interval: Duration,

    pub sample: CounterSample,
    pub blocks_per_sec: f64,
    pub mib_per_sec: f64,
    pub commands_per_sec: f64,

    /// Hardware counter name and its increase over the interval
    pub counter: Option<(String, u64)>,
}

impl fmt::Display for ThroughputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:4}s] {:>8} blocks/s  {:>10.2} MiB/s  {:>8} cmds/s  ({} cmds)",
            self.elapsed.as_secs(),
            format_rate(self.blocks_per_sec),
            self.mib_per_sec,
            format_rate(self.commands_per_sec),
            format_count(self.sample.commands)
        )?;
        if let Some((name, delta)) = &self.counter {
            write!(f, "  {}: {}", name, format_count(*delta))?;
        }
        Ok(())
    }
}

/// Periodic reporter
pub struct LiveReporter {
    block_shift: u32,
    print: bool,
    counter: Option<CounterTracker>,
    counter_total: u64,
    started: Instant,
    last_tick: Instant,
    totals: CounterSample,
}

impl LiveReporter {
    /// Create a reporter for a device with `1 << block_shift` byte blocks
    ///
    /// With `print` false lines are computed but not written to stdout.
    pub fn new(block_shift: u32, print: bool) -> Self {
        let now = Instant::now();
        Self {
            block_shift,
            print,
            counter: None,
            counter_total: 0,
            started: now,
            last_tick: now,
            totals: CounterSample::default(),
        }
    }

    /// Attach a hardware counter
    pub fn with_counter(mut self, counter: CounterTracker) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Mark the start of the run (and start the hardware counter)
    pub fn start(&mut self) -> crate::Result<()> {
        if let Some(counter) = self.counter.as_mut() {
            counter.start()?;
        }
        let now = Instant::now();
        self.started = now;
        self.last_tick = now;
        Ok(())
    }

    /// Close an interval with the counters drained for it
    pub fn tick(&mut self, sample: CounterSample) -> crate::Result<ThroughputLine> {
        let now = Instant::now();
        let interval = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.totals += sample;

        let counter = match self.counter.as_mut() {
            Some(tracker) => {
                let delta = tracker.delta()?;
                self.counter_total += delta;
                Some((tracker.name(), delta))
            }
            None => None,
        };

        let line = ThroughputLine {
            elapsed: now.duration_since(self.started),
            interval,
            sample,
            blocks_per_sec: per_second(sample.blocks, interval),
            mib_per_sec: mib_per_second(sample.blocks, self.block_shift, interval),
            commands_per_sec: per_second(sample.commands, interval),
            counter,
        };

        if self.print {
            println!("{}", line);
        }
        Ok(line)
    }

    /// Add counts drained after the last tick to the totals without printing
    pub fn finish(&mut self, sample: CounterSample) -> crate::Result<()> {
        self.totals += sample;
        if let Some(tracker) = self.counter.as_mut() {
            self.counter_total += tracker.delta()?;
        }
        Ok(())
    }

    /// Everything reported so far
    pub fn totals(&self) -> CounterSample {
        self.totals
    }

    /// Hardware counter name and total since `start`
    pub fn counter_total(&self) -> Option<(String, u64)> {
        self.counter
            .as_ref()
            .map(|tracker| (tracker.name(), self.counter_total))
    }
}
