//! Pattern command-line options
//!
//! Patterns receive the tokens that follow the pattern name on the command
//! line and parse them with clap, independently of the engine flags.

use crate::device::Opcode;
use clap::{Args, Parser, ValueEnum};

/// Transfer direction, named from the device's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// Device to memory
    Read,
    /// Memory to device
    Write,
}

impl Direction {
    pub fn opcode(self) -> Opcode {
        match self {
            Direction::Read => Opcode::Read,
            Direction::Write => Opcode::Write,
        }
    }
}

/// Options shared by the data-moving patterns
#[derive(Debug, Clone, Args)]
pub struct TransferArgs {
    /// Buffer size in blocks
    #[arg(short = 'b', long = "blocks", value_parser = clap::value_parser!(u64).range(1..))]
    pub blocks: Option<u64>,

    /// Transfer direction
    #[arg(short = 'o', long = "op", value_enum, default_value_t = Direction::Read)]
    pub op: Direction,
}

/// Options of `full` and `seq`
#[derive(Debug, Parser)]
#[command(no_binary_name = true)]
pub struct SweepArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Options of `random`
#[derive(Debug, Parser)]
#[command(no_binary_name = true)]
pub struct RandomArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Seed for reproducible offsets (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Parse `args` for the pattern called `pattern`
pub fn parse<P: Parser>(pattern: &str, args: &[String]) -> crate::Result<P> {
    P::try_parse_from(args)
        .map_err(|e| anyhow::anyhow!("Invalid arguments for pattern '{}': {}", pattern, e))
}
