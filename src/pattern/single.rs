//! Single rotating block

use super::{Command, Pattern};
use crate::device::FeatureDescriptor;

const ROTATION_BLOCKS: u64 = 31;

/// One-block reads rotating over a small fixed buffer
#[derive(Debug, Default)]
pub struct SinglePattern {
    current: u64,
}

impl SinglePattern {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pattern for SinglePattern {
    fn description(&self) -> &'static str {
        "Sequentially transfer a single block."
    }

    fn buffer_blocks(&self) -> u64 {
        ROTATION_BLOCKS
    }

    fn next_command(&mut self, _features: &FeatureDescriptor) -> Command {
        let target = self.current;
        self.current = (self.current + 1) % ROTATION_BLOCKS;
        Command::read(1, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_is_deterministic() {
        let features = FeatureDescriptor::new("SN", "MODEL", 1 << 20, 9, 8);
        let run = || {
            let mut pattern = SinglePattern::new();
            (0..100)
                .map(|_| pattern.next_command(&features))
                .collect::<Vec<_>>()
        };

        let first = run();
        assert_eq!(first, run());
        assert_eq!(first[0], Command::read(1, 0));
        assert_eq!(first[30], Command::read(1, 30));
        assert_eq!(first[31], Command::read(1, 0));
    }
}
