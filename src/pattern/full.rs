//! Full-buffer sweep
//!
//! Transfers the whole buffer front to back in the largest commands the device
//! accepts, then starts over.

use super::options::{self, SweepArgs};
use super::{Command, Pattern};
use crate::device::{FeatureDescriptor, Opcode};

pub const DEFAULT_BUFFER_BLOCKS: u64 = 1_000_000;

#[derive(Debug)]
pub struct FullPattern {
    blocks: u64,
    op: Opcode,
    /// Blocks left in the current sweep (0 starts a new one)
    remaining: u64,
}

impl FullPattern {
    pub fn new() -> Self {
        Self::with_blocks(DEFAULT_BUFFER_BLOCKS, Opcode::Read)
    }

    pub fn with_blocks(blocks: u64, op: Opcode) -> Self {
        Self {
            blocks,
            op,
            remaining: 0,
        }
    }
}

impl Default for FullPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for FullPattern {
    fn description(&self) -> &'static str {
        "Sweep the whole buffer in maximum-size transfers."
    }

    fn configure(&mut self, args: &[String]) -> crate::Result<()> {
        let parsed: SweepArgs = options::parse("full", args)?;
        self.blocks = parsed.transfer.blocks.unwrap_or(DEFAULT_BUFFER_BLOCKS);
        self.op = parsed.transfer.op.opcode();
        self.remaining = 0;
        Ok(())
    }

    fn buffer_blocks(&self) -> u64 {
        self.blocks
    }

    fn next_command(&mut self, features: &FeatureDescriptor) -> Command {
        if self.remaining == 0 {
            self.remaining = self.blocks;
        }
        let target = self.blocks - self.remaining;
        let count = self.remaining.min(features.max_transfer_blocks as u64);
        self.remaining -= count;
        Command::new(self.op, count as u32, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(max_transfer: u32) -> FeatureDescriptor {
        FeatureDescriptor::new("SN", "MODEL", 1 << 30, 9, max_transfer)
    }

    #[test]
    fn test_sweep_in_max_size_commands() {
        let mut pattern = FullPattern::with_blocks(1000, Opcode::Read);
        let features = features(500);

        let first = pattern.next_command(&features);
        let second = pattern.next_command(&features);
        assert_eq!(first, Command::read(500, 0));
        assert_eq!(second, Command::read(500, 500));

        // Next sweep starts over
        assert_eq!(pattern.next_command(&features), Command::read(500, 0));
    }

    #[test]
    fn test_sweep_with_short_tail() {
        let mut pattern = FullPattern::with_blocks(10, Opcode::Write);
        let features = features(4);

        let sweep: Vec<_> = (0..3).map(|_| pattern.next_command(&features)).collect();
        assert_eq!(
            sweep,
            vec![Command::write(4, 0), Command::write(4, 4), Command::write(2, 8)]
        );
        let covered: u64 = sweep.iter().map(|c| c.block_count as u64).sum();
        assert_eq!(covered, 10);
    }

    #[test]
    fn test_configure() {
        let mut pattern = FullPattern::new();
        assert_eq!(pattern.buffer_blocks(), DEFAULT_BUFFER_BLOCKS);

        pattern
            .configure(&["-b".to_string(), "64".to_string(), "-o".to_string(), "write".to_string()])
            .unwrap();
        assert_eq!(pattern.buffer_blocks(), 64);
        assert_eq!(pattern.next_command(&features(8)), Command::write(8, 0));
    }
}
