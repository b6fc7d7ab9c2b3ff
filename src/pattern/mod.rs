//! Command patterns
//!
//! A pattern is the command source of a run: it sizes the shared buffer and
//! produces the sequence of commands the workers execute.
//!
//! # Patterns
//!
//! - **full**: sweep the whole buffer in maximum-size transfers
//! - **seq**: one block at a time, sequentially through the buffer
//! - **random**: maximum-size transfers at random buffer offsets
//! - **single**: rotate a single block over 31 buffer blocks
//! - **flush**: flush commands only
//! - **noop**: park the calling thread forever
//!
//! # Thread Safety
//!
//! Patterns are `Send` but **not** `Sync`: one pattern instance produces one
//! logical command stream, and the worker pool serializes every call to
//! `next_command` behind a single mutex. Implementations can therefore keep
//! plain mutable cursors and RNGs.
//!
//! # Example
//!
//! ```
//! use nvbench::device::{FeatureDescriptor, Opcode};
//! use nvbench::pattern;
//!
//! let features = FeatureDescriptor::new("SN", "MODEL", 1 << 30, 9, 500);
//! let mut full = pattern::create("full")?;
//! full.configure(&["-b".to_string(), "1000".to_string()])?;
//! assert_eq!(full.buffer_blocks(), 1000);
//!
//! let first = full.next_command(&features);
//! assert_eq!((first.op, first.block_count, first.target_block), (Opcode::Read, 500, 0));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod flush;
pub mod full;
pub mod noop;
pub mod options;
pub mod random;
pub mod seq;
pub mod single;

use crate::device::{FeatureDescriptor, Opcode};

/// One unit of work produced by a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub op: Opcode,

    /// Blocks to transfer (0 for Flush)
    pub block_count: u32,

    /// First buffer block the command transfers through
    pub target_block: u64,
}

impl Command {
    pub fn new(op: Opcode, block_count: u32, target_block: u64) -> Self {
        Self {
            op,
            block_count,
            target_block,
        }
    }

    /// Device to memory transfer
    pub fn read(block_count: u32, target_block: u64) -> Self {
        Self::new(Opcode::Read, block_count, target_block)
    }

    /// Memory to device transfer
    pub fn write(block_count: u32, target_block: u64) -> Self {
        Self::new(Opcode::Write, block_count, target_block)
    }

    pub fn flush() -> Self {
        Self::new(Opcode::Flush, 0, 0)
    }
}

/// Command source contract
pub trait Pattern: Send {
    /// One-line description shown by `--list-patterns` and in the banner
    fn description(&self) -> &'static str;

    /// Apply the pattern-specific trailing command-line arguments
    ///
    /// Called once, before `buffer_blocks`. Patterns without options reject
    /// any argument.
    fn configure(&mut self, args: &[String]) -> crate::Result<()> {
        if let Some(arg) = args.first() {
            anyhow::bail!("Pattern takes no arguments (got '{}')", arg);
        }
        Ok(())
    }

    /// Size of the shared buffer in blocks
    fn buffer_blocks(&self) -> u64;

    /// Produce the next command
    ///
    /// Called repeatedly for the whole run. May block the calling thread
    /// indefinitely (see `noop`).
    fn next_command(&mut self, features: &FeatureDescriptor) -> Command;
}

/// Registered pattern names
pub const NAMES: &[&str] = &["full", "seq", "random", "single", "flush", "noop"];

/// Instantiate the pattern registered as `name`
pub fn create(name: &str) -> crate::Result<Box<dyn Pattern>> {
    let pattern: Box<dyn Pattern> = match name {
        "full" => Box::new(full::FullPattern::new()),
        "seq" => Box::new(seq::SequentialPattern::new()),
        "random" => Box::new(random::RandomPattern::new()),
        "single" => Box::new(single::SinglePattern::new()),
        "flush" => Box::new(flush::FlushPattern),
        "noop" => Box::new(noop::NoopPattern),
        other => anyhow::bail!(
            "Unknown pattern '{}' (available: {})",
            other,
            NAMES.join(", ")
        ),
    };
    Ok(pattern)
}

/// Whether `name` is a registered pattern
pub fn is_registered(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Name and description of every registered pattern
pub fn available() -> Vec<(&'static str, &'static str)> {
    NAMES
        .iter()
        .filter_map(|name| create(name).ok().map(|p| (*name, p.description())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_every_registered_pattern() {
        for name in NAMES {
            let pattern = create(name).unwrap();
            assert!(!pattern.description().is_empty());
        }
        assert_eq!(available().len(), NAMES.len());
    }

    #[test]
    fn test_create_unknown_pattern() {
        let err = create("zigzag").err().unwrap().to_string();
        assert!(err.contains("Unknown pattern 'zigzag'"));
        assert!(err.contains("full, seq, random"));
        assert!(!is_registered("zigzag"));
        assert!(is_registered("single"));
    }

    #[test]
    fn test_patterns_without_options_reject_arguments() {
        for name in ["single", "flush", "noop"] {
            let mut pattern = create(name).unwrap();
            assert!(pattern.configure(&[]).is_ok());
            assert!(pattern.configure(&["-b".to_string()]).is_err());
        }
    }

    #[test]
    fn test_command_constructors() {
        assert_eq!(Command::read(4, 8), Command::new(Opcode::Read, 4, 8));
        assert_eq!(Command::write(1, 0).op, Opcode::Write);
        assert_eq!(Command::flush().block_count, 0);
    }
}
