//! Sequential single-block pattern

use super::options::{self, SweepArgs};
use super::{Command, Pattern};
use crate::device::{FeatureDescriptor, Opcode};

pub const DEFAULT_BUFFER_BLOCKS: u64 = 1000;

/// Walks the buffer one block per command, wrapping at the end
#[derive(Debug)]
pub struct SequentialPattern {
    blocks: u64,
    op: Opcode,
    current_block: u64,
}

impl SequentialPattern {
    pub fn new() -> Self {
        Self {
            blocks: DEFAULT_BUFFER_BLOCKS,
            op: Opcode::Read,
            current_block: 0,
        }
    }
}

impl Default for SequentialPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for SequentialPattern {
    fn description(&self) -> &'static str {
        "Transfer one block at a time, sequentially through the buffer."
    }

    fn configure(&mut self, args: &[String]) -> crate::Result<()> {
        let parsed: SweepArgs = options::parse("seq", args)?;
        self.blocks = parsed.transfer.blocks.unwrap_or(DEFAULT_BUFFER_BLOCKS);
        self.op = parsed.transfer.op.opcode();
        self.current_block = 0;
        Ok(())
    }

    fn buffer_blocks(&self) -> u64 {
        self.blocks
    }

    fn next_command(&mut self, _features: &FeatureDescriptor) -> Command {
        let block = self.current_block;
        self.current_block += 1;
        if self.current_block >= self.blocks {
            self.current_block = 0;
        }
        Command::new(self.op, 1, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_wraparound() {
        let features = FeatureDescriptor::new("SN", "MODEL", 1 << 20, 12, 32);
        let mut pattern = SequentialPattern::new();
        pattern.configure(&["--blocks".to_string(), "3".to_string()]).unwrap();

        let targets: Vec<_> = (0..5)
            .map(|_| pattern.next_command(&features).target_block)
            .collect();
        assert_eq!(targets, vec![0, 1, 2, 0, 1]);
        assert_eq!(pattern.next_command(&features).block_count, 1);
    }
}
