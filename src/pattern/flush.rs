//! Flush-only pattern

use super::{Command, Pattern};
use crate::device::FeatureDescriptor;

#[derive(Debug, Default)]
pub struct FlushPattern;

impl Pattern for FlushPattern {
    fn description(&self) -> &'static str {
        "Send only flush commands, no data transfer."
    }

    fn buffer_blocks(&self) -> u64 {
        0
    }

    fn next_command(&mut self, _features: &FeatureDescriptor) -> Command {
        Command::flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Opcode;

    #[test]
    fn test_flush_only() {
        let features = FeatureDescriptor::new("SN", "MODEL", 1 << 20, 9, 8);
        let mut pattern = FlushPattern;
        assert_eq!(pattern.buffer_blocks(), 0);
        let cmd = pattern.next_command(&features);
        assert_eq!(cmd.op, Opcode::Flush);
        assert_eq!(cmd.block_count, 0);
    }
}
