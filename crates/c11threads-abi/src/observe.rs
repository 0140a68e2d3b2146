//! Per-family observation of ABI results.
//!
//! Every entry point funnels its `ThrdResult` through here on the way out:
//! the call is counted, non-success outcomes are counted and traced, and the
//! result is handed back unchanged. Counters are relaxed atomics and never
//! influence what the caller receives.

use std::ffi::c_int;
use std::sync::atomic::{AtomicU64, Ordering};

use c11threads_core::trace::{self, TraceRecord};
use c11threads_core::{ApiFamily, ThrdResult, ThrdStatus};

struct FamilyCounters {
    calls: AtomicU64,
    busy: AtomicU64,
    errors: AtomicU64,
}

impl FamilyCounters {
    const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

static COUNTERS: [FamilyCounters; ApiFamily::COUNT] =
    [const { FamilyCounters::new() }; ApiFamily::COUNT];
static POLL_RETRIES: AtomicU64 = AtomicU64::new(0);

/// Point-in-time copy of one family's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilySnapshot {
    pub calls: u64,
    pub busy: u64,
    /// `thrd_error` and `thrd_nomem` results.
    pub errors: u64,
}

/// Count one call and pass `result` through, tracing it if it failed.
pub(crate) fn finish<T>(
    family: ApiFamily,
    symbol: &'static str,
    result: ThrdResult<T>,
) -> ThrdResult<T> {
    let slot = &COUNTERS[family.index()];
    slot.calls.fetch_add(1, Ordering::Relaxed);
    if let Err(err) = &result {
        match err.status() {
            ThrdStatus::Busy => slot.busy.fetch_add(1, Ordering::Relaxed),
            _ => slot.errors.fetch_add(1, Ordering::Relaxed),
        };
        trace::emit(&TraceRecord::from_error(family, symbol, *err));
    }
    result
}

/// [`finish`] collapsed to the C result code.
pub(crate) fn code(family: ApiFamily, symbol: &'static str, result: ThrdResult<()>) -> c_int {
    ThrdStatus::of(&finish(family, symbol, result)).code()
}

/// Count a call that cannot fail.
pub(crate) fn infallible(family: ApiFamily) {
    COUNTERS[family.index()]
        .calls
        .fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn note_poll_retry() {
    POLL_RETRIES.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot one family's counters.
#[must_use]
pub fn snapshot(family: ApiFamily) -> FamilySnapshot {
    let slot = &COUNTERS[family.index()];
    FamilySnapshot {
        calls: slot.calls.load(Ordering::Relaxed),
        busy: slot.busy.load(Ordering::Relaxed),
        errors: slot.errors.load(Ordering::Relaxed),
    }
}

/// Trylock iterations spent inside the poll timed-lock strategy.
#[must_use]
pub fn poll_retries() -> u64 {
    POLL_RETRIES.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn reset_counters_for_tests() {
    for slot in &COUNTERS {
        slot.calls.store(0, Ordering::Relaxed);
        slot.busy.store(0, Ordering::Relaxed);
        slot.errors.store(0, Ordering::Relaxed);
    }
    POLL_RETRIES.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use c11threads_core::ThrdError;

    // Lower bounds only: other unit tests bump the same counters concurrently.
    #[test]
    fn finish_counts_by_outcome() {
        let before = snapshot(ApiFamily::Once);
        assert_eq!(finish(ApiFamily::Once, "call_once", Ok(5)), Ok(5));
        assert_eq!(
            code(ApiFamily::Once, "call_once", Err(ThrdError::Busy)),
            3
        );
        assert_eq!(
            code(ApiFamily::Once, "call_once", Err(ThrdError::NoMem)),
            4
        );
        assert_eq!(
            code(
                ApiFamily::Once,
                "call_once",
                Err(ThrdError::InvalidArgument("flag"))
            ),
            2
        );
        infallible(ApiFamily::Once);
        let after = snapshot(ApiFamily::Once);
        assert!(after.calls >= before.calls + 5);
        assert!(after.busy > before.busy);
        assert!(after.errors >= before.errors + 2);
    }
}
