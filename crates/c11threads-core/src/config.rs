//! Runtime and build-time configuration.
//!
//! Tracing is set via the `C11THREADS_TRACE` environment variable:
//! - `off` (default): no records are written.
//! - `stderr`: one JSON line per non-success result on standard error.
//! - anything else: treated as a file path, opened for append.
//!
//! The timed-lock strategy is fixed at build time (see [`TIMEDLOCK_STRATEGY`]).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable selecting the trace sink.
pub const TRACE_ENV: &str = "C11THREADS_TRACE";

/// Where trace records go.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum TraceTarget {
    #[default]
    Off,
    Stderr,
    File(PathBuf),
}

impl TraceTarget {
    /// Parse from string (case-insensitive keywords, otherwise a path).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "off" | "none" | "0" | "false" => Self::Off,
            "stderr" | "2" => Self::Stderr,
            _ => Self::File(PathBuf::from(trimmed)),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Read `C11THREADS_TRACE` now, without caching.
#[must_use]
pub fn resolve_trace_target() -> TraceTarget {
    std::env::var(TRACE_ENV)
        .map(|v| TraceTarget::from_str_loose(&v))
        .unwrap_or_default()
}

// Atomic cache: 0=unresolved, 1=off, 2=on, 255=resolving.
static CACHED_TRACE: AtomicU8 = AtomicU8::new(0);

const TRACE_UNRESOLVED: u8 = 0;
const TRACE_OFF: u8 = 1;
const TRACE_ON: u8 = 2;
const TRACE_RESOLVING: u8 = 255;

/// Whether tracing is enabled (reads the environment on first call, caches
/// thereafter).
///
/// A call that races the first resolution sees `false` instead of waiting.
#[must_use]
pub fn trace_enabled() -> bool {
    match CACHED_TRACE.load(Ordering::Acquire) {
        TRACE_ON => return true,
        TRACE_OFF | TRACE_RESOLVING => return false,
        _ => {}
    }

    if CACHED_TRACE
        .compare_exchange(
            TRACE_UNRESOLVED,
            TRACE_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return CACHED_TRACE.load(Ordering::Acquire) == TRACE_ON;
    }

    let enabled = resolve_trace_target().is_enabled();
    CACHED_TRACE.store(
        if enabled { TRACE_ON } else { TRACE_OFF },
        Ordering::Release,
    );
    enabled
}

/// Force the cached trace switch. Test and harness hook.
#[doc(hidden)]
pub fn set_trace_enabled_for_tests(enabled: Option<bool>) {
    let v = match enabled {
        None => TRACE_UNRESOLVED,
        Some(false) => TRACE_OFF,
        Some(true) => TRACE_ON,
    };
    CACHED_TRACE.store(v, Ordering::Release);
}

/// How `mtx_timedlock` waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimedLockStrategy {
    /// The host's own deadline-aware lock.
    Native,
    /// Repeated trylock plus yield until the deadline.
    Poll,
}

impl TimedLockStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Poll => "poll",
        }
    }
}

/// Strategy compiled into this build. Targets without a usable
/// `pthread_mutex_timedlock` always poll.
pub const TIMEDLOCK_STRATEGY: TimedLockStrategy = if cfg!(any(
    feature = "poll-timedlock",
    target_vendor = "apple",
    target_os = "netbsd",
    target_os = "cygwin"
)) {
    TimedLockStrategy::Poll
} else {
    TimedLockStrategy::Native
};
