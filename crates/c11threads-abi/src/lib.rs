//! # c11threads-abi
//!
//! `extern "C"` surface of the C11 `<threads.h>` facade.
//!
//! This crate produces a `cdylib` exposing `call_once`, `cnd_*`, `mtx_*`,
//! `thrd_*`, `tss_*` and `xtime_get`. Each entry point null-checks its
//! arguments, forwards to the host pthreads library, and collapses the
//! outcome into the closed `thrd_*` result-code set.
//!
//! # Architecture
//!
//! ```text
//! C caller -> ABI entry (this crate) -> host pthreads -> ThrdResult -> observe -> code
//! ```
//!
//! Null or malformed arguments never abort: functions with a result return
//! `thrd_error`, `void` functions return without effect.

// Entry points null-check their raw pointers uniformly.
#![allow(clippy::missing_safety_doc)]
// C11 spells its types and constants in lowercase.
#![allow(non_camel_case_types, non_upper_case_globals)]

mod host;

pub mod cond_abi;
pub mod mutex_abi;
pub mod observe;
pub mod once_abi;
pub mod thread_abi;
pub mod time_abi;
pub mod timedlock;
pub mod tss_abi;

use std::ffi::c_int;

use c11threads_core::status::{THRD_BUSY, THRD_ERROR, THRD_NOMEM, THRD_SUCCESS};

pub const thrd_success: c_int = THRD_SUCCESS;
pub const thrd_error: c_int = THRD_ERROR;
pub const thrd_busy: c_int = THRD_BUSY;
pub const thrd_nomem: c_int = THRD_NOMEM;

pub use cond_abi::*;
pub use mutex_abi::*;
pub use once_abi::*;
pub use thread_abi::*;
pub use time_abi::*;
pub use tss_abi::*;
