//! Output formatting
//!
//! Console output only: the startup banner and the end-of-run summary.
//! Live lines are produced by `stats::live`.

pub mod text;
