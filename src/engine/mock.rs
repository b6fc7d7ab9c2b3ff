//! Mock device for testing
//!
//! This module provides a recording implementation of `DeviceBackend` that never
//! touches hardware, making engine, worker and coordinator tests fast and
//! deterministic.
//!
//! # Features
//!
//! - Records every command the "device" sees, in completion order, together
//!   with the submitting thread and the status it completed with
//! - Scripted failure: complete the n-th command with a chosen status
//! - Configurable geometry and batch support
//! - Counts control calls so batching can be observed
//!
//! # Example
//!
//! ```
//! use nvbench::device::{DeviceBackend, FeatureDescriptor, IoRequest, Opcode};
//! use nvbench::engine::mock::MockDevice;
//!
//! let device = MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 4096, 9, 8))
//!     .fail_command(1, 0x02);
//!
//! let request = IoRequest { opcode: Opcode::Read, addr: 0, device_block: 0, block_count: 1 };
//! assert!(device.submit_io(&request).is_ok());
//! assert!(device.submit_io(&request).is_err());
//! assert_eq!(device.submitted_count(), 2);
//! ```

use crate::device::{DeviceBackend, FeatureDescriptor, IoError, IoRequest, NvmeStatus, Opcode};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Record of a command seen by the mock device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub thread: ThreadId,
    pub opcode: Opcode,
    pub device_block: u64,
    pub block_count: u32,
    pub addr: u64,
    pub status: u16,
}

#[derive(Debug, Default)]
struct MockState {
    records: Vec<SubmissionRecord>,
    control_calls: u64,
}

/// Recording fake device
#[derive(Debug)]
pub struct MockDevice {
    features: FeatureDescriptor,
    batch: bool,
    fail_at: Option<(usize, u16)>,
    latency: Option<Duration>,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Create a mock device reporting `features`
    ///
    /// By default the device completes every command successfully and does not
    /// support batched submission.
    pub fn new(features: FeatureDescriptor) -> Self {
        Self {
            features,
            batch: false,
            fail_at: None,
            latency: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Advertise (or not) batched submission support
    pub fn with_batch_support(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Complete the command with ordinal `ordinal` (0-based, counted over every
    /// command the device sees) with `status`
    pub fn fail_command(mut self, ordinal: usize, status: u16) -> Self {
        self.fail_at = Some((ordinal, status));
        self
    }

    /// Sleep for `latency` inside every control call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Copy of every command seen so far
    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.lock().records.clone()
    }

    /// Number of commands seen so far
    pub fn submitted_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Number of control calls (a batch counts once)
    pub fn control_calls(&self) -> u64 {
        self.lock().control_calls
    }

    /// Total blocks moved by read and write commands
    pub fn transferred_blocks(&self) -> u64 {
        self.lock()
            .records
            .iter()
            .map(|r| r.block_count as u64)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, state: &mut MockState, opcode: Opcode, request: Option<&IoRequest>) -> u16 {
        let status = match self.fail_at {
            Some((ordinal, status)) if ordinal == state.records.len() => status,
            _ => 0,
        };
        state.records.push(SubmissionRecord {
            thread: thread::current().id(),
            opcode,
            device_block: request.map_or(0, |r| r.device_block),
            block_count: request.map_or(0, |r| r.block_count),
            addr: request.map_or(0, |r| r.addr),
            status,
        });
        status
    }

    fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
    }
}

fn to_result(status: u16) -> Result<(), IoError> {
    if status == 0 {
        Ok(())
    } else {
        Err(IoError::DriverRejected {
            status: NvmeStatus(status),
        })
    }
}

impl DeviceBackend for MockDevice {
    fn identify(&self) -> Result<FeatureDescriptor, IoError> {
        Ok(self.features.clone())
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    fn submit_io(&self, request: &IoRequest) -> Result<(), IoError> {
        self.simulate_latency();
        let mut state = self.lock();
        state.control_calls += 1;
        let status = self.complete(&mut state, request.opcode, Some(request));
        to_result(status)
    }

    fn submit_batch(&self, requests: &[IoRequest], statuses: &mut [u16]) -> Result<(), IoError> {
        if !self.batch {
            return Err(IoError::SystemFailure(std::io::Error::from_raw_os_error(
                libc::ENOTTY,
            )));
        }
        self.simulate_latency();
        let mut state = self.lock();
        state.control_calls += 1;
        for (request, status) in requests.iter().zip(statuses.iter_mut()) {
            *status = self.complete(&mut state, request.opcode, Some(request));
        }
        Ok(())
    }

    fn io_command(&self, opcode: Opcode) -> Result<(), IoError> {
        self.simulate_latency();
        let mut state = self.lock();
        state.control_calls += 1;
        let status = self.complete(&mut state, opcode, None);
        to_result(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(block: u64) -> IoRequest {
        IoRequest {
            opcode: Opcode::Write,
            addr: 0x1000,
            device_block: block,
            block_count: 4,
        }
    }

    #[test]
    fn test_mock_device_records_commands() {
        let device = MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 1024, 9, 8));
        device.submit_io(&request(3)).unwrap();
        device.io_command(Opcode::Flush).unwrap();

        let records = device.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].opcode, Opcode::Write);
        assert_eq!(records[0].device_block, 3);
        assert_eq!(records[0].block_count, 4);
        assert_eq!(records[0].thread, thread::current().id());
        assert_eq!(records[1].opcode, Opcode::Flush);
        assert_eq!(device.transferred_blocks(), 4);
    }

    #[test]
    fn test_mock_device_scripted_failure() {
        let device = MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 1024, 9, 8))
            .fail_command(1, 0x281);
        assert!(device.submit_io(&request(0)).is_ok());
        let err = device.submit_io(&request(1)).unwrap_err();
        assert_eq!(err.status(), Some(NvmeStatus(0x281)));
        assert!(device.submit_io(&request(2)).is_ok());
    }

    #[test]
    fn test_mock_device_batch_statuses() {
        let device = MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 1024, 9, 8))
            .with_batch_support(true)
            .fail_command(2, 0x4);
        let requests: Vec<_> = (0..4).map(request).collect();
        let mut statuses = vec![0u16; 4];
        device.submit_batch(&requests, &mut statuses).unwrap();
        assert_eq!(statuses, vec![0, 0, 0x4, 0]);
        assert_eq!(device.control_calls(), 1);
    }

    #[test]
    fn test_mock_device_without_batch_rejects_batches() {
        let device = MockDevice::new(FeatureDescriptor::new("SN", "MOCK", 1024, 9, 8));
        let mut statuses = vec![0u16; 1];
        let err = device.submit_batch(&[request(0)], &mut statuses).unwrap_err();
        assert!(matches!(err, IoError::SystemFailure(_)));
    }

    #[test]
    fn test_mock_device_identify() {
        let features = FeatureDescriptor::new("SN", "MOCK", 1024, 9, 8);
        let device = MockDevice::new(features.clone());
        assert_eq!(device.identify().unwrap(), features);
    }
}
