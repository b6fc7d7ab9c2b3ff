//! Command submission layer
//!
//! This module turns engine commands into device control calls. Each worker owns
//! one `Submitter`, which runs in one of two modes selected once at startup:
//!
//! - **Direct**: every command is one control call and its status is checked
//!   immediately.
//! - **Batched**: commands are queued in a per-worker array and handed to the
//!   driver as a single call when the array is full. Statuses are validated only
//!   after the call returns, in submission order. Only available when the driver
//!   advertises batch support.
//!
//! Batching is a pure performance optimization: for the same command sequence
//! both modes issue the same commands in the same order and report the same
//! failing command. The batch is per worker, so commands of one worker are never
//! reordered relative to each other.
//!
//! # Example
//!
//! ```
//! use nvbench::device::{DeviceBackend, FeatureDescriptor, Opcode};
//! use nvbench::engine::mock::MockDevice;
//! use nvbench::engine::{SubmitMode, Submitter};
//! use std::sync::Arc;
//!
//! let device = Arc::new(MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 1 << 20, 12, 32)));
//! let mode = SubmitMode::select(device.as_ref(), true, 1000);
//! let mut submitter = Submitter::new(device.clone(), mode, 32);
//!
//! let mut page = vec![0u8; 4096];
//! submitter.submit(Opcode::Write, page.as_mut_ptr(), 0, 1)?;
//! submitter.flush()?;
//! assert_eq!(device.submitted_count(), 2);
//! # Ok::<(), nvbench::device::IoError>(())
//! ```

pub mod context;
pub mod mock;

pub use context::EngineContext;

use crate::device::{DeviceBackend, IoError, IoRequest, NvmeStatus, Opcode};
use std::fmt;
use std::sync::Arc;

/// Commands per batched submission unless configured otherwise
pub const DEFAULT_BATCH_CAPACITY: usize = 1000;

/// How commands reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// One control call per command
    Direct,

    /// Up to `capacity` commands per control call
    Batched { capacity: usize },
}

impl SubmitMode {
    /// Pick the submission mode for a device
    ///
    /// Batched mode is used only when it is allowed, the capacity is at least 1,
    /// and the driver supports it.
    pub fn select(device: &dyn DeviceBackend, allow_batch: bool, capacity: usize) -> Self {
        if allow_batch && capacity > 0 && device.supports_batch() {
            SubmitMode::Batched { capacity }
        } else {
            SubmitMode::Direct
        }
    }

    pub fn is_batched(&self) -> bool {
        matches!(self, SubmitMode::Batched { .. })
    }
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitMode::Direct => write!(f, "direct"),
            SubmitMode::Batched { capacity } => {
                write!(f, "batched ({} commands per call)", capacity)
            }
        }
    }
}

/// Per-worker submission state
///
/// # Thread Safety
///
/// A `Submitter` is owned by exactly one worker thread. The device it wraps is
/// shared; the pending batch is not.
pub struct Submitter {
    device: Arc<dyn DeviceBackend>,
    mode: SubmitMode,
    max_transfer: u32,
    pending: Vec<IoRequest>,
    statuses: Vec<u16>,
}

impl Submitter {
    /// Create a submitter
    ///
    /// # Arguments
    ///
    /// * `device` - Shared device backend
    /// * `mode` - Submission mode, usually from `SubmitMode::select`
    /// * `max_transfer` - Maximum blocks per read/write command
    pub fn new(device: Arc<dyn DeviceBackend>, mode: SubmitMode, max_transfer: u32) -> Self {
        let capacity = match mode {
            SubmitMode::Direct => 0,
            SubmitMode::Batched { capacity } => capacity,
        };
        Self {
            device,
            mode,
            max_transfer,
            pending: Vec::with_capacity(capacity),
            statuses: Vec::with_capacity(capacity),
        }
    }

    pub fn mode(&self) -> SubmitMode {
        self.mode
    }

    /// Commands queued but not yet handed to the device
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Submit one command
    ///
    /// `buffer` is the address of the first buffer byte the command transfers.
    /// A Flush opcode is routed to `flush()` and ignores the other arguments.
    ///
    /// In batched mode the command is only queued unless it fills the batch; an
    /// error therefore may belong to an earlier command of the same batch (see
    /// `IoError::BatchRejected::index`).
    ///
    /// # Errors
    ///
    /// - `InvalidTransfer` for zero blocks or more than the device maximum,
    ///   before anything is submitted
    /// - `DriverRejected` / `BatchRejected` for a non-success completion
    /// - `SystemFailure` when the control call fails
    pub fn submit(
        &mut self,
        opcode: Opcode,
        buffer: *mut u8,
        device_block: u64,
        block_count: u32,
    ) -> Result<(), IoError> {
        if opcode == Opcode::Flush {
            return self.flush();
        }
        if block_count == 0 || block_count > self.max_transfer {
            return Err(IoError::InvalidTransfer {
                block_count,
                max: self.max_transfer,
            });
        }

        let request = IoRequest {
            opcode,
            addr: buffer as u64,
            device_block,
            block_count,
        };

        match self.mode {
            SubmitMode::Direct => self.device.submit_io(&request),
            SubmitMode::Batched { capacity } => {
                self.pending.push(request);
                if self.pending.len() >= capacity {
                    self.submit_pending()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Issue a Flush command
    ///
    /// Pending batched commands are submitted first so the flush is ordered
    /// after every command this worker issued before it.
    pub fn flush(&mut self) -> Result<(), IoError> {
        self.drain()?;
        self.device.io_command(Opcode::Flush)
    }

    /// Submit the partial batch, if any
    pub fn drain(&mut self) -> Result<(), IoError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.submit_pending()
    }

    fn submit_pending(&mut self) -> Result<(), IoError> {
        self.statuses.clear();
        self.statuses.resize(self.pending.len(), 0);

        let result = self.device.submit_batch(&self.pending, &mut self.statuses);
        self.pending.clear();
        result?;

        match self
            .statuses
            .iter()
            .position(|&status| !NvmeStatus(status).is_success())
        {
            Some(index) => Err(IoError::BatchRejected {
                index,
                status: NvmeStatus(self.statuses[index]),
            }),
            None => Ok(()),
        }
    }
}
