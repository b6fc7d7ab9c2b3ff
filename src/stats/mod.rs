//! Statistics collection
//!
//! Lock-free per-worker throughput counters.
//!
//! Each worker owns one `WorkerCounters` slot and increments it after every
//! command. The reporter drains all slots once per interval with an atomic swap,
//! so a concurrent increment lands either in this interval or the next one and
//! is never lost or double counted. Counters are cache-line aligned so workers
//! do not false-share.
//!
//! # Example
//!
//! ```
//! use nvbench::stats::PoolCounters;
//!
//! let counters = PoolCounters::new(2);
//! counters.worker(0).record(8);
//! counters.worker(1).record(8);
//!
//! let sample = counters.drain();
//! assert_eq!(sample.blocks, 16);
//! assert_eq!(sample.commands, 2);
//! assert_eq!(counters.drain().commands, 0);
//! ```

pub mod live;

use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache-line aligned atomic counter to prevent false sharing
///
/// ```text
/// [value: 8 bytes][padding: 56 bytes] = 64 bytes total
/// ```
#[repr(align(64))]
#[derive(Debug)]
pub struct AlignedCounter {
    value: AtomicU64,
    _padding: [u8; 56],
}

impl AlignedCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; 56],
        }
    }

    /// Increment the counter by `val`
    ///
    /// Relaxed ordering: counters carry no ordering relationship with each
    /// other or with the I/O they count.
    #[inline]
    pub fn add(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Read the counter and reset it to zero in one atomic step
    #[inline]
    pub fn take(&self) -> u64 {
        self.value.swap(0, Ordering::Relaxed)
    }
}

impl Default for AlignedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks and commands counted over some period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSample {
    pub blocks: u64,
    pub commands: u64,
}

impl Add for CounterSample {
    type Output = CounterSample;

    fn add(self, other: CounterSample) -> CounterSample {
        CounterSample {
            blocks: self.blocks + other.blocks,
            commands: self.commands + other.commands,
        }
    }
}

impl AddAssign for CounterSample {
    fn add_assign(&mut self, other: CounterSample) {
        self.blocks += other.blocks;
        self.commands += other.commands;
    }
}

/// Counters of one worker since the last drain
#[derive(Debug, Default)]
pub struct WorkerCounters {
    blocks: AlignedCounter,
    commands: AlignedCounter,
}

impl WorkerCounters {
    /// Count one executed command of `blocks` blocks (0 for Flush)
    #[inline]
    pub fn record(&self, blocks: u32) {
        self.blocks.add(blocks as u64);
        self.commands.add(1);
    }

    /// Current values without resetting them
    pub fn peek(&self) -> CounterSample {
        CounterSample {
            blocks: self.blocks.get(),
            commands: self.commands.get(),
        }
    }

    /// Read and reset
    pub fn take(&self) -> CounterSample {
        CounterSample {
            blocks: self.blocks.take(),
            commands: self.commands.take(),
        }
    }
}

/// Counter slots for a whole worker pool, indexed by worker id
#[derive(Debug)]
pub struct PoolCounters {
    workers: Vec<WorkerCounters>,
}

impl PoolCounters {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: (0..workers).map(|_| WorkerCounters::default()).collect(),
        }
    }

    /// Number of worker slots
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Slot of worker `id`
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range; the pool is sized for its worker count.
    pub fn worker(&self, id: usize) -> &WorkerCounters {
        &self.workers[id]
    }

    /// Drain every slot and return the sum
    pub fn drain(&self) -> CounterSample {
        self.workers
            .iter()
            .map(WorkerCounters::take)
            .fold(CounterSample::default(), |acc, sample| acc + sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_aligned_counter_layout() {
        assert_eq!(std::mem::size_of::<AlignedCounter>(), 64);
        assert_eq!(std::mem::align_of::<AlignedCounter>(), 64);
    }

    #[test]
    fn test_aligned_counter_take_resets() {
        let counter = AlignedCounter::new();
        counter.add(5);
        counter.add(7);
        assert_eq!(counter.get(), 12);
        assert_eq!(counter.take(), 12);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_worker_counters_record() {
        let counters = WorkerCounters::default();
        counters.record(8);
        counters.record(0);
        assert_eq!(counters.peek(), CounterSample { blocks: 8, commands: 2 });
        assert_eq!(counters.take(), CounterSample { blocks: 8, commands: 2 });
        assert_eq!(counters.peek(), CounterSample::default());
    }

    #[test]
    fn test_counter_sample_add() {
        let mut total = CounterSample { blocks: 1, commands: 1 };
        total += CounterSample { blocks: 4, commands: 2 };
        assert_eq!(total, CounterSample { blocks: 5, commands: 3 });
    }

    #[test]
    fn test_concurrent_drain_loses_nothing() {
        let counters = Arc::new(PoolCounters::new(4));
        let mut handles = Vec::new();
        for id in 0..4 {
            let counters = counters.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    counters.worker(id).record(2);
                }
            }));
        }

        let mut total = CounterSample::default();
        while handles.iter().any(|h| !h.is_finished()) {
            total += counters.drain();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        total += counters.drain();

        assert_eq!(total.commands, 40_000);
        assert_eq!(total.blocks, 80_000);
    }
}
