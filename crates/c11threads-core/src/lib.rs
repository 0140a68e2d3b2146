//! # c11threads-core
//!
//! Safe Rust building blocks for the C11 `<threads.h>` facade.
//!
//! Everything here works on plain values and never touches caller memory:
//! result codes and the typed error behind them, mutex-type validation and
//! the mutex transition contract, the `XTime` time point, runtime
//! configuration, and the structured trace sink. The `extern "C"` surface
//! lives in `c11threads-abi`. No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod config;
pub mod mutex;
pub mod status;
pub mod time;
pub mod trace;

pub use mutex::{MtxBase, MtxKind};
pub use status::{ApiFamily, ThrdError, ThrdResult, ThrdStatus};
pub use time::XTime;
