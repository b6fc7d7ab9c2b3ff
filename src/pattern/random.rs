//! Random offset pattern
//!
//! Maximum-size transfers at uniformly random buffer offsets. Uses the
//! xoshiro256++ PRNG; `--seed` makes the sequence reproducible.

use super::options::{self, RandomArgs};
use super::{Command, Pattern};
use crate::device::{FeatureDescriptor, Opcode};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

pub const DEFAULT_BUFFER_BLOCKS: u64 = 1_000_000;

pub struct RandomPattern {
    blocks: u64,
    op: Opcode,
    rng: Xoshiro256PlusPlus,
}

impl RandomPattern {
    /// Create a pattern seeded from the OS entropy source
    pub fn new() -> Self {
        Self {
            blocks: DEFAULT_BUFFER_BLOCKS,
            op: Opcode::Read,
            rng: Xoshiro256PlusPlus::from_entropy(),
        }
    }

    /// Create a pattern with a fixed seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            ..Self::new()
        }
    }
}

impl Default for RandomPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for RandomPattern {
    fn description(&self) -> &'static str {
        "Maximum-size transfers at random buffer offsets."
    }

    fn configure(&mut self, args: &[String]) -> crate::Result<()> {
        let parsed: RandomArgs = options::parse("random", args)?;
        self.blocks = parsed.transfer.blocks.unwrap_or(DEFAULT_BUFFER_BLOCKS);
        self.op = parsed.transfer.op.opcode();
        if let Some(seed) = parsed.seed {
            self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        }
        Ok(())
    }

    fn buffer_blocks(&self) -> u64 {
        self.blocks
    }

    fn next_command(&mut self, features: &FeatureDescriptor) -> Command {
        let count = self.blocks.min(features.max_transfer_blocks as u64);
        let target = if self.blocks > count {
            self.rng.gen_range(0..self.blocks - count)
        } else {
            0
        };
        Command::new(self.op, count as u32, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureDescriptor {
        FeatureDescriptor::new("SN", "MODEL", 1 << 30, 9, 16)
    }

    fn seeded(seed: u64) -> RandomPattern {
        let mut pattern = RandomPattern::new();
        pattern
            .configure(&[
                "-b".to_string(),
                "1000".to_string(),
                "--seed".to_string(),
                seed.to_string(),
            ])
            .unwrap();
        pattern
    }

    #[test]
    fn test_commands_stay_inside_buffer() {
        let mut pattern = seeded(1);
        let features = features();
        for _ in 0..10_000 {
            let cmd = pattern.next_command(&features);
            assert_eq!(cmd.block_count, 16);
            assert!(cmd.target_block + cmd.block_count as u64 <= 1000);
        }
    }

    #[test]
    fn test_seeded_sequence_is_deterministic() {
        let features = features();
        let mut a = seeded(42);
        let mut b = seeded(42);
        let first: Vec<_> = (0..100).map(|_| a.next_command(&features)).collect();
        let second: Vec<_> = (0..100).map(|_| b.next_command(&features)).collect();
        assert_eq!(first, second);

        let c = RandomPattern::with_seed(42);
        assert_eq!(c.buffer_blocks(), DEFAULT_BUFFER_BLOCKS);
    }

    #[test]
    fn test_buffer_smaller_than_transfer() {
        let mut pattern = RandomPattern::with_seed(3);
        pattern.configure(&["-b".to_string(), "4".to_string()]).unwrap();
        assert_eq!(pattern.next_command(&features()), Command::read(4, 0));
    }
}
