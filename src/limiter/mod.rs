//! Shared rate limiter
//!
//! A two-level token budget shared by every worker:
//!
//! - **Local** limits (blocks and/or commands per interval) are replenished by a
//!   dedicated refill thread every `interval / resolution`, each time to
//!   `limit / resolution`.
//! - **Global** limits (blocks and/or commands for the whole run) only ever
//!   decrease; when one is exhausted the run ends.
//!
//! # Protocol
//!
//! The budget lives behind one mutex with one condition variable. A worker
//! calls `acquire` before each command: it waits on the condition variable
//! while any configured local counter is exhausted, then debits the command's
//! cost from every configured counter. Debits may drive a counter negative, so
//! a single command can overshoot the budget by at most its own cost. Every
//! refill wakes all waiters, which then race for the fresh budget; there is no
//! fairness beyond that.
//!
//! A limiter without local limits never blocks and needs no refill thread. A
//! run without any limit does not create a limiter at all.
//!
//! # Example
//!
//! ```
//! use nvbench::limiter::{Acquire, RateLimiter, RateLimits};
//!
//! let limiter = RateLimiter::new(RateLimits {
//!     global_commands: Some(2),
//!     ..RateLimits::default()
//! })?;
//!
//! assert_eq!(limiter.acquire(8), Acquire::Granted { last: false });
//! assert_eq!(limiter.acquire(8), Acquire::Granted { last: true });
//! assert_eq!(limiter.acquire(8), Acquire::Exhausted);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Context;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configured limits
///
/// `None` means unlimited for that dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    /// Blocks per interval
    pub local_blocks: Option<u64>,

    /// Commands per interval
    pub local_commands: Option<u64>,

    /// Blocks for the whole run
    pub global_blocks: Option<u64>,

    /// Commands for the whole run
    pub global_commands: Option<u64>,

    /// Number of refills per interval
    pub resolution: u32,

    /// Length of the interval the local limits are expressed in
    pub interval: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            local_blocks: None,
            local_commands: None,
            global_blocks: None,
            global_commands: None,
            resolution: 1,
            interval: Duration::from_secs(1),
        }
    }
}

impl RateLimits {
    pub fn has_local(&self) -> bool {
        self.local_blocks.is_some() || self.local_commands.is_some()
    }

    pub fn has_global(&self) -> bool {
        self.global_blocks.is_some() || self.global_commands.is_some()
    }

    /// No dimension is limited
    pub fn is_unlimited(&self) -> bool {
        !self.has_local() && !self.has_global()
    }

    /// Time between refills
    pub fn slot(&self) -> Duration {
        self.interval / self.resolution.max(1)
    }

    fn per_slot(&self, limit: Option<u64>) -> Option<i64> {
        limit.map(|limit| budget(limit / self.resolution.max(1) as u64))
    }
}

/// Budgets are signed so a debit can overshoot; limits beyond `i64::MAX`
/// are effectively unlimited
fn budget(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Outcome of `RateLimiter::acquire`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Execute the command. `last` is set when this debit exhausted a global
    /// limit: the caller executes the command and then stops.
    Granted { last: bool },

    /// A global limit was already exhausted; do not execute the command
    Exhausted,

    /// The limiter was shut down
    Stopped,
}

#[derive(Debug)]
struct Budget {
    local_blocks: i64,
    local_commands: i64,
    global_blocks: Option<i64>,
    global_commands: Option<i64>,
    closed: bool,
    refills: u64,
}

impl Budget {
    fn global_exhausted(&self) -> bool {
        self.global_blocks.map_or(false, |left| left <= 0)
            || self.global_commands.map_or(false, |left| left <= 0)
    }
}

/// Budget shared by all workers and the refill thread
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    slot_blocks: Option<i64>,
    slot_commands: Option<i64>,
    state: Mutex<Budget>,
    refilled: Condvar,
}

impl RateLimiter {
    /// Create a limiter with a full first slot
    ///
    /// # Errors
    ///
    /// Fails if the resolution is 0 or a local limit is smaller than the
    /// resolution (the per-slot budget would be 0 and workers would never run).
    pub fn new(limits: RateLimits) -> crate::Result<Self> {
        anyhow::ensure!(limits.resolution >= 1, "Limit resolution must be at least 1");
        let slot_blocks = limits.per_slot(limits.local_blocks);
        let slot_commands = limits.per_slot(limits.local_commands);
        for (name, slot) in [("block", slot_blocks), ("command", slot_commands)] {
            if slot == Some(0) {
                anyhow::bail!(
                    "Local {} rate is below the limit resolution ({}); every slot would be empty",
                    name,
                    limits.resolution
                );
            }
        }

        let budget = Budget {
            local_blocks: slot_blocks.unwrap_or(0),
            local_commands: slot_commands.unwrap_or(0),
            global_blocks: limits.global_blocks.map(budget),
            global_commands: limits.global_commands.map(budget),
            closed: false,
            refills: 0,
        };

        Ok(Self {
            limits,
            slot_blocks,
            slot_commands,
            state: Mutex::new(budget),
            refilled: Condvar::new(),
        })
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Reserve budget for one command of `blocks` blocks
    ///
    /// Blocks while a local limit is exhausted, until the next refill or
    /// `shutdown`.
    pub fn acquire(&self, blocks: u32) -> Acquire {
        let mut budget = self.lock();
        loop {
            if budget.closed {
                return Acquire::Stopped;
            }
            if budget.global_exhausted() {
                return Acquire::Exhausted;
            }
            if !self.local_exhausted(&budget) {
                break;
            }
            budget = self
                .refilled
                .wait(budget)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let blocks = blocks as i64;
        if self.slot_blocks.is_some() {
            budget.local_blocks -= blocks;
        }
        if self.slot_commands.is_some() {
            budget.local_commands -= 1;
        }
        if let Some(left) = budget.global_blocks.as_mut() {
            *left -= blocks;
        }
        if let Some(left) = budget.global_commands.as_mut() {
            *left -= 1;
        }

        Acquire::Granted {
            last: budget.global_exhausted(),
        }
    }

    /// Reset the local budget to one slot's worth and wake all waiters
    pub fn refill(&self) {
        {
            let mut budget = self.lock();
            if let Some(slot) = self.slot_blocks {
                budget.local_blocks = slot;
            }
            if let Some(slot) = self.slot_commands {
                budget.local_commands = slot;
            }
            budget.refills += 1;
        }
        self.refilled.notify_all();
    }

    /// Release every waiter; all later acquires return `Stopped`
    pub fn shutdown(&self) {
        self.lock().closed = true;
        self.refilled.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of refills so far
    pub fn refills(&self) -> u64 {
        self.lock().refills
    }

    /// Start the refill thread
    ///
    /// Returns `None` without starting anything when no local limit is
    /// configured. The thread exits on the first wakeup after `shutdown`; it is
    /// never joined.
    pub fn spawn_refill(self: &Arc<Self>) -> crate::Result<Option<JoinHandle<()>>> {
        if !self.limits.has_local() {
            return Ok(None);
        }

        let limiter = Arc::clone(self);
        let slot = self.limits.slot();
        let handle = thread::Builder::new()
            .name("nvbench-refill".to_string())
            .spawn(move || loop {
                thread::sleep(slot);
                if limiter.is_closed() {
                    break;
                }
                limiter.refill();
            })
            .context("Failed to spawn rate limiter refill thread")?;
        Ok(Some(handle))
    }

    fn local_exhausted(&self, budget: &Budget) -> bool {
        (self.slot_blocks.is_some() && budget.local_blocks <= 0)
            || (self.slot_commands.is_some() && budget.local_commands <= 0)
    }

    fn lock(&self) -> MutexGuard<'_, Budget> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
