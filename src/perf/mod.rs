//! Hardware performance counters
//!
//! Optional observability for a run: a single counter selected on the command
//! line by its perf event name (for example `cache-misses` or `task-clock`).
//! The engine only needs three things from a counter backend: a name, a way to
//! start counting and a way to read the cumulative value. Those are captured by
//! the `CounterSource` trait; `CounterTracker` turns cumulative reads into
//! per-interval deltas for the live reporter.
//!
//! On Linux the backend is `perf_event_open(2)` (see `events`). Counters are
//! opened for the whole process and inherited by the worker threads, so they
//! must be opened before the workers are spawned.

#[cfg(target_os = "linux")]
pub mod events;

use anyhow::Context;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Counter family, matching the kernel's `PERF_TYPE_*` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Hardware,
    Software,
}

impl EventKind {
    pub fn type_id(self) -> u32 {
        match self {
            EventKind::Hardware => 0,
            EventKind::Software => 1,
        }
    }
}

/// Countable events: (name, kind, config)
pub const EVENTS: &[(&str, EventKind, u64)] = &[
    ("cycles", EventKind::Hardware, 0),
    ("instructions", EventKind::Hardware, 1),
    ("cache-references", EventKind::Hardware, 2),
    ("cache-misses", EventKind::Hardware, 3),
    ("branch-instructions", EventKind::Hardware, 4),
    ("branch-misses", EventKind::Hardware, 5),
    ("bus-cycles", EventKind::Hardware, 6),
    ("ref-cycles", EventKind::Hardware, 9),
    ("cpu-clock", EventKind::Software, 0),
    ("task-clock", EventKind::Software, 1),
    ("page-faults", EventKind::Software, 2),
    ("context-switches", EventKind::Software, 3),
    ("cpu-migrations", EventKind::Software, 4),
];

/// Parsed `-p` selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSelector {
    pub name: &'static str,
    pub kind: EventKind,
    pub config: u64,
}

impl fmt::Display for CounterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for CounterSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        EVENTS
            .iter()
            .find(|(name, _, _)| *name == wanted)
            .map(|&(name, kind, config)| Self { name, kind, config })
            .ok_or_else(|| {
                let names: Vec<&str> = EVENTS.iter().map(|(name, _, _)| *name).collect();
                anyhow::anyhow!(
                    "Invalid counter selector '{}'\nValid counters are: {}",
                    s,
                    names.join(" ")
                )
            })
    }
}

/// A cumulative hardware counter
pub trait CounterSource: Send {
    /// Name printed next to counter values
    fn name(&self) -> String;

    /// Program and start the counter
    fn start(&mut self) -> crate::Result<()>;

    /// Cumulative value since `start`
    fn read(&mut self) -> crate::Result<u64>;
}

/// Open the counter backend for `selector`
#[cfg(target_os = "linux")]
pub fn open(selector: &CounterSelector) -> crate::Result<Box<dyn CounterSource>> {
    let counter = events::PerfCounter::open(selector)?;
    Ok(Box::new(counter))
}

#[cfg(not(target_os = "linux"))]
pub fn open(selector: &CounterSelector) -> crate::Result<Box<dyn CounterSource>> {
    anyhow::bail!(
        "Hardware counter {} requested but perf events are only supported on Linux",
        selector
    )
}

/// Turns cumulative counter reads into interval deltas
pub struct CounterTracker {
    source: Box<dyn CounterSource>,
    last: u64,
}

impl CounterTracker {
    pub fn new(source: Box<dyn CounterSource>) -> Self {
        Self { source, last: 0 }
    }

    pub fn name(&self) -> String {
        self.source.name()
    }

    /// Start counting; deltas are measured from here
    pub fn start(&mut self) -> crate::Result<()> {
        self.source
            .start()
            .with_context(|| format!("Failed to start counter {}", self.source.name()))?;
        self.last = self.source.read()?;
        Ok(())
    }

    /// Counter increase since the previous call (or `start`)
    pub fn delta(&mut self) -> crate::Result<u64> {
        let now = self.source.read()?;
        let delta = now.saturating_sub(self.last);
        self.last = now;
        Ok(delta)
    }
}

/// Final counter line, e.g. `cache-misses: 1000 over 2.00s (500 per second)`
pub fn format_total(name: &str, total: u64, elapsed: Duration) -> String {
    format!(
        "{}: {} over {:.2}s ({:.0} per second)",
        name,
        total,
        elapsed.as_secs_f64(),
        crate::util::time::per_second(total, elapsed)
    )
}
