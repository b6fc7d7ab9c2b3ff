//! Device access
//!
//! This module defines what the engine knows about the storage device and how it
//! talks to it:
//!
//! - **FeatureDescriptor**: immutable geometry read once at startup (block size,
//!   capacity, maximum blocks per command, identifying strings)
//! - **DeviceBackend**: the control-call surface used by the submission layer
//! - **IoError**: the device error taxonomy
//!
//! # Backends
//!
//! - **nvme**: Linux NVMe character/block device driven through ioctls
//! - **engine::mock::MockDevice**: recording fake device used by the tests
//!
//! # Opcode direction
//!
//! Opcodes are named from the device's point of view, matching the NVMe command
//! set: `Write` moves data from memory to the device, `Read` moves data from the
//! device into memory.

pub mod status;

#[cfg(target_os = "linux")]
pub mod nvme;

pub use status::NvmeStatus;

use std::fmt;
use thiserror::Error;

/// Maximum blocks per command assumed when the controller cannot be identified
pub const FALLBACK_MAX_TRANSFER_BLOCKS: u32 = 8;

/// Accepted logical block sizes, as shifts (512 B to 64 KiB)
pub const LBA_SHIFT_RANGE: std::ops::RangeInclusive<u32> = 9..=16;

/// Upper bound on blocks per command (16-bit zero-based block count)
pub const MAX_TRANSFER_LIMIT: u32 = 65536;

/// Immutable device geometry
///
/// Produced once by `DeviceBackend::identify` and shared read-only by all
/// workers and the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    /// Controller serial number
    pub serial: String,

    /// Controller model number
    pub model: String,

    /// Namespace size in logical blocks
    pub capacity_blocks: u64,

    /// Logical block size as a shift (block size = 1 << shift)
    pub lba_shift: u32,

    /// Maximum blocks a single read or write may transfer
    pub max_transfer_blocks: u32,
}

impl FeatureDescriptor {
    pub fn new(
        serial: impl Into<String>,
        model: impl Into<String>,
        capacity_blocks: u64,
        lba_shift: u32,
        max_transfer_blocks: u32,
    ) -> Self {
        Self {
            serial: serial.into(),
            model: model.into(),
            capacity_blocks,
            lba_shift,
            max_transfer_blocks,
        }
    }

    /// Logical block size in bytes
    #[inline]
    pub fn block_size(&self) -> u64 {
        1u64 << self.lba_shift
    }

    /// Convert a block count to bytes
    #[inline]
    pub fn blocks_to_bytes(&self, blocks: u64) -> u64 {
        blocks << self.lba_shift
    }

    /// Namespace capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.blocks_to_bytes(self.capacity_blocks)
    }
}

/// NVM command set opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Commit volatile write cache to media (no data transfer)
    Flush,
    /// Memory to device
    Write,
    /// Device to memory
    Read,
}

impl Opcode {
    /// Wire value of the opcode
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Opcode::Flush => 0x00,
            Opcode::Write => 0x01,
            Opcode::Read => 0x02,
        }
    }

    /// Whether the command moves data through the buffer
    #[inline]
    pub fn transfers_data(self) -> bool {
        !matches!(self, Opcode::Flush)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Flush => write!(f, "flush"),
            Opcode::Write => write!(f, "write"),
            Opcode::Read => write!(f, "read"),
        }
    }
}

/// One data command as handed to a backend
///
/// `block_count` is the natural (one-based) count; backends convert it to the
/// zero-based wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    pub opcode: Opcode,

    /// Address of the first buffer byte
    pub addr: u64,

    /// Starting logical block on the device
    pub device_block: u64,

    /// Number of logical blocks to transfer (at least 1)
    pub block_count: u32,
}

/// Device error taxonomy
///
/// Every variant is fatal to the run. Nothing is retried: throughput measured
/// after silently recovering from a device error would not mean anything.
#[derive(Debug, Error)]
pub enum IoError {
    /// The device completed the command with a non-success status
    #[error("device rejected command: {status}")]
    DriverRejected { status: NvmeStatus },

    /// The control call itself failed (permissions, resources, bad descriptor)
    #[error("device control call failed: {0}")]
    SystemFailure(#[from] std::io::Error),

    /// Read or write of zero blocks or more than the device accepts per command
    #[error("invalid transfer of {block_count} blocks (device maximum is {max})")]
    InvalidTransfer { block_count: u32, max: u32 },

    /// The namespace reports a logical block size the engine cannot address
    #[error("unsupported LBA format: block size 2^{lba_shift} (expected 512 B to 64 KiB)")]
    UnsupportedFormat { lba_shift: u32 },

    /// A command inside a submitted batch completed with a non-success status
    #[error("batched command #{index} rejected: {status}")]
    BatchRejected { index: usize, status: NvmeStatus },
}

impl IoError {
    /// Device status carried by the error, if the device produced one
    pub fn status(&self) -> Option<NvmeStatus> {
        match self {
            IoError::DriverRejected { status } | IoError::BatchRejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Control-call surface of a storage device
///
/// Implementations are shared by all workers (`Send + Sync`); any per-thread
/// state such as a pending batch lives in the caller's `engine::Submitter`.
pub trait DeviceBackend: Send + Sync {
    /// Read the device geometry
    fn identify(&self) -> Result<FeatureDescriptor, IoError>;

    /// Whether the driver accepts batched submissions
    ///
    /// Probed once when the device is opened.
    fn supports_batch(&self) -> bool;

    /// Submit one read or write as a single control call
    fn submit_io(&self, request: &IoRequest) -> Result<(), IoError>;

    /// Submit all `requests` as a single control call
    ///
    /// On success `statuses[i]` holds the completion status of `requests[i]`;
    /// `statuses` has the same length as `requests`. An `Err` means the call
    /// itself failed and no per-command status is available.
    fn submit_batch(&self, requests: &[IoRequest], statuses: &mut [u16]) -> Result<(), IoError>;

    /// Submit a command without data transfer (e.g. Flush)
    fn io_command(&self, opcode: Opcode) -> Result<(), IoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_descriptor_sizes() {
        let features = FeatureDescriptor::new("SN", "MODEL", 1 << 20, 12, 64);
        assert_eq!(features.block_size(), 4096);
        assert_eq!(features.blocks_to_bytes(3), 3 * 4096);
        assert_eq!(features.capacity_bytes(), 4096 << 20);
    }

    #[test]
    fn test_opcode_codes() {
        assert_eq!(Opcode::Flush.code(), 0x00);
        assert_eq!(Opcode::Write.code(), 0x01);
        assert_eq!(Opcode::Read.code(), 0x02);
        assert!(!Opcode::Flush.transfers_data());
        assert!(Opcode::Read.transfers_data());
    }

    #[test]
    fn test_io_error_display() {
        let err = IoError::DriverRejected { status: NvmeStatus(0x80) };
        assert_eq!(err.to_string(), "device rejected command: LBA_RANGE(0080)");

        let err = IoError::BatchRejected { index: 7, status: NvmeStatus(0x2) };
        assert!(err.to_string().contains("#7"));
        assert_eq!(err.status(), Some(NvmeStatus(0x2)));

        let err = IoError::InvalidTransfer { block_count: 0, max: 8 };
        assert_eq!(err.status(), None);

        let err = IoError::UnsupportedFormat { lba_shift: 0 };
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("2^0"));
    }
}
