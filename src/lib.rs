//! goldrun: a golden-output test harness.
//!
//! Fixtures are source files whose leading comment block declares how to compile them,
//! how to run the result, and the exact stdout expected. The harness loads those
//! headers, runs every case through the compile/run/compare pipeline with bounded
//! parallelism, and reports the outcomes in discovery order.

pub use crate::diagnostics::{DriverError, HarnessError, LoadError};

pub mod cancel;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod fixture;
pub mod process;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod testing;
