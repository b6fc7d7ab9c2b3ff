//! Idle pattern
//!
//! Parks every worker that asks it for a command. Useful for measuring the
//! harness itself, or the hardware counters of an idle system.

use super::{Command, Pattern};
use crate::device::FeatureDescriptor;
use std::thread;

#[derive(Debug, Default)]
pub struct NoopPattern;

impl Pattern for NoopPattern {
    fn description(&self) -> &'static str {
        "Don't do anything."
    }

    fn buffer_blocks(&self) -> u64 {
        0
    }

    /// Never returns; the calling thread stays parked until process exit.
    fn next_command(&mut self, _features: &FeatureDescriptor) -> Command {
        loop {
            thread::park();
        }
    }
}
