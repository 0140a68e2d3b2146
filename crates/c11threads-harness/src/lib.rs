//! # c11threads-harness
//!
//! Conformance harness for the C11 threads facade.
//!
//! Runs named scenarios against the live `extern "C"` surface, emits
//! structured JSONL evidence, and renders the mutex transition contract
//! as a machine-readable matrix.

#![deny(unsafe_code)]

pub mod contract_matrix;
pub mod runner;
#[allow(unsafe_code)]
pub mod scenarios;
pub mod structured_log;

pub use runner::{ConformanceRunner, HarnessError, RunSummary, ScenarioReport};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, StreamKind};
