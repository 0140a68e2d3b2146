//! Structured trace of non-success results.
//!
//! Each record is one JSON object per line. The sink is resolved lazily from
//! [`config::TRACE_ENV`](crate::config::TRACE_ENV) on the first record and is
//! only locked while a single line is written. Trace failures are swallowed:
//! tracing never changes what an operation returns.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{self, TraceTarget};
use crate::status::{ApiFamily, ThrdError, ThrdStatus};

/// Severity of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    /// Contention and expired deadlines.
    Debug,
    /// Everything the caller sees as `thrd_error` or `thrd_nomem`.
    Warn,
}

/// One traced ABI result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub timestamp_ns: u64,
    pub level: TraceLevel,
    pub api_family: ApiFamily,
    pub symbol: &'static str,
    pub status: ThrdStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Which argument was rejected, for `InvalidArgument`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl TraceRecord {
    /// Record for a failed call, timestamped now.
    #[must_use]
    pub fn from_error(api_family: ApiFamily, symbol: &'static str, err: ThrdError) -> Self {
        let status = err.status();
        Self {
            timestamp_ns: now_ns(),
            level: if status == ThrdStatus::Busy {
                TraceLevel::Debug
            } else {
                TraceLevel::Warn
            },
            api_family,
            symbol,
            status,
            errno: err.errno(),
            reason: match err {
                ThrdError::InvalidArgument(reason) => Some(reason),
                _ => None,
            },
        }
    }

    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

enum SinkState {
    Unresolved,
    Disabled,
    Active(Box<dyn Write + Send>),
}

static SINK: Mutex<SinkState> = parking_lot::const_mutex(SinkState::Unresolved);

fn open_target(target: TraceTarget) -> SinkState {
    match target {
        TraceTarget::Off => SinkState::Disabled,
        TraceTarget::Stderr => SinkState::Active(Box::new(io::stderr())),
        TraceTarget::File(path) => match OpenOptions::new().create(true).append(true).open(path)
        {
            Ok(file) => SinkState::Active(Box::new(file)),
            Err(_) => SinkState::Disabled,
        },
    }
}

/// Write one record if tracing is enabled.
pub fn emit(record: &TraceRecord) {
    if !config::trace_enabled() {
        return;
    }
    let Ok(mut line) = record.to_json_line() else {
        return;
    };
    line.push('\n');

    let mut sink = SINK.lock();
    if matches!(*sink, SinkState::Unresolved) {
        *sink = open_target(config::resolve_trace_target());
    }
    if let SinkState::Active(writer) = &mut *sink {
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

/// Route records to `writer` and force tracing on.
#[doc(hidden)]
pub fn install_writer(writer: Box<dyn Write + Send>) {
    *SINK.lock() = SinkState::Active(writer);
    config::set_trace_enabled_for_tests(Some(true));
}

/// Drop the current sink and force tracing off.
pub fn disable() {
    *SINK.lock() = SinkState::Disabled;
    config::set_trace_enabled_for_tests(Some(false));
}

/// Forget the resolved sink so the next record re-reads the environment.
#[doc(hidden)]
pub fn reset_for_tests() {
    *SINK.lock() = SinkState::Unresolved;
    config::set_trace_enabled_for_tests(None);
}
