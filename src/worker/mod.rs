//! Worker thread implementation
//!
//! A worker is one execution unit of the pool. Each iteration it:
//!
//! 1. takes the next command from the pattern (under the pattern mutex, which
//!    is released before any I/O),
//! 2. reserves rate budget, possibly blocking until the next refill,
//! 3. picks the device block (random for reads, the command's own buffer
//!    offset for writes),
//! 4. submits the command through its own `Submitter`,
//! 5. counts the command in its counter slot.
//!
//! The loop ends when a global limit is exhausted, when a stop is requested, or
//! on the first I/O error. On an orderly exit the worker submits its partial
//! batch before returning.
//!
//! Commands of one worker reach the device in the order the pattern produced
//! them; commands of different workers are not ordered.

pub mod pool;

pub use pool::{WorkerEvent, WorkerPool};

use crate::config::CacheMode;
use crate::device::Opcode;
use crate::engine::{EngineContext, Submitter};
use crate::limiter::Acquire;
use crate::pattern::Command;
use crate::Result;
use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

/// Why a worker stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// A global block or command limit was exhausted
    GlobalLimit,

    /// The coordinator requested a stop
    Stopped,
}

/// One worker of the pool
pub struct Worker {
    id: usize,
    ctx: Arc<EngineContext>,
    submitter: Submitter,

    /// Source of read locations on the device
    rng: Xoshiro256PlusPlus,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<EngineContext>) -> Self {
        let submitter = Submitter::new(
            ctx.device.clone(),
            ctx.submit_mode,
            ctx.features.max_transfer_blocks,
        );
        Self {
            id,
            ctx,
            submitter,
            rng: Xoshiro256PlusPlus::from_entropy(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until a limit, a stop request or an error
    pub fn run(&mut self) -> Result<WorkerExit> {
        let exit = self.run_loop()?;
        self.submitter
            .drain()
            .with_context(|| format!("Worker {} failed to submit its final batch", self.id))?;
        Ok(exit)
    }

    fn run_loop(&mut self) -> Result<WorkerExit> {
        let ctx = Arc::clone(&self.ctx);
        let counters = ctx.counters.worker(self.id);

        loop {
            if ctx.stop_requested() {
                return Ok(WorkerExit::Stopped);
            }

            let command = ctx.next_command();

            let last = match &ctx.limiter {
                Some(limiter) => match limiter.acquire(command.block_count) {
                    Acquire::Granted { last } => last,
                    Acquire::Exhausted => return Ok(WorkerExit::GlobalLimit),
                    Acquire::Stopped => return Ok(WorkerExit::Stopped),
                },
                None => false,
            };

            self.execute(&ctx, command).with_context(|| {
                format!(
                    "Worker {}: {} of {} blocks at buffer block {} failed",
                    self.id, command.op, command.block_count, command.target_block
                )
            })?;
            counters.record(command.block_count);

            if last {
                return Ok(WorkerExit::GlobalLimit);
            }
        }
    }

    fn execute(&mut self, ctx: &EngineContext, command: Command) -> Result<()> {
        if !command.op.transfers_data() {
            self.submitter.flush()?;
            return Ok(());
        }

        let buffer = ctx.buffer.block_ptr(command.target_block, command.block_count)?;
        if ctx.cache_mode == CacheMode::Always {
            ctx.buffer.touch(command.target_block, command.block_count);
        }

        let device_block = match command.op {
            Opcode::Read => self.read_source(ctx.features.capacity_blocks, command.block_count),
            _ => command.target_block,
        };

        self.submitter
            .submit(command.op, buffer, device_block, command.block_count)?;
        Ok(())
    }

    /// Random device block a read of `count` blocks can start at
    fn read_source(&mut self, capacity: u64, count: u32) -> u64 {
        let count = count as u64;
        if capacity > count {
            self.rng.gen_range(0..capacity - count)
        } else {
            0
        }
    }
}
