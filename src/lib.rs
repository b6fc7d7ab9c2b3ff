//! nvbench - NVMe block-storage throughput benchmark
//!
//! nvbench drives an NVMe namespace through the driver's passthrough
//! interface with a configurable number of worker threads and reports the
//! throughput it sustains.
//!
//! # Architecture
//!
//! - **Patterns**: a pluggable command source shared by all workers behind a
//!   mutex (`full`, `seq`, `random`, `single`, `flush`, `noop`)
//! - **Workers**: one OS thread each, with its own direct or batched submitter
//! - **Rate limiter**: per-interval budgets refilled by a background thread,
//!   plus lifetime totals that end the run
//! - **Coordinator**: live throughput lines, stop conditions, final summary

pub mod config;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod limiter;
pub mod output;
pub mod pattern;
pub mod perf;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use device::{DeviceBackend, FeatureDescriptor, IoError};
pub use engine::EngineContext;

/// Result type used throughout nvbench
pub type Result<T> = anyhow::Result<T>;
