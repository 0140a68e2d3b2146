//! Result codes and the typed error behind them.
//!
//! The C surface reports one of four codes. Internally every operation is a
//! `ThrdResult<T>` so host failures can be composed with `?` and still carry
//! the errno that produced them until the ABI boundary collapses them.

use serde::Serialize;
use thiserror::Error;

/// `thrd_success`.
pub const THRD_SUCCESS: i32 = 0;
/// `thrd_error`. Value `1` is the emulation header's timeout slot, which is
/// never produced: expiry of a timed operation reports [`THRD_BUSY`].
pub const THRD_ERROR: i32 = 2;
/// `thrd_busy`: contention, or a timed operation whose deadline expired.
pub const THRD_BUSY: i32 = 3;
/// `thrd_nomem`: resource exhaustion while creating something.
pub const THRD_NOMEM: i32 = 4;

/// Closed set of result codes visible to C callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrdStatus {
    Success,
    Error,
    Busy,
    NoMem,
}

impl ThrdStatus {
    /// Integer value returned across the C ABI.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => THRD_SUCCESS,
            Self::Error => THRD_ERROR,
            Self::Busy => THRD_BUSY,
            Self::NoMem => THRD_NOMEM,
        }
    }

    /// Parse a C result code. Unknown values (including the unused timeout
    /// slot) yield `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            THRD_SUCCESS => Some(Self::Success),
            THRD_ERROR => Some(Self::Error),
            THRD_BUSY => Some(Self::Busy),
            THRD_NOMEM => Some(Self::NoMem),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Collapse a typed result into its status.
    #[must_use]
    pub fn of<T>(result: &ThrdResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => err.status(),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Busy => "busy",
            Self::NoMem => "nomem",
        }
    }
}

/// Why an operation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThrdError {
    /// Null handle, unknown mutex type, malformed time point, unknown clock.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The host threading library returned this errno.
    #[error("host threading call failed with errno {0}")]
    Native(i32),
    /// The primitive is held by someone else.
    #[error("resource busy")]
    Busy,
    /// The absolute deadline passed before the operation completed.
    #[error("deadline expired")]
    TimedOut,
    /// Allocation failed while creating a primitive or thread.
    #[error("out of memory")]
    NoMem,
}

impl ThrdError {
    /// Map onto the closed C code set.
    #[must_use]
    pub const fn status(self) -> ThrdStatus {
        match self {
            Self::InvalidArgument(_) | Self::Native(_) => ThrdStatus::Error,
            Self::Busy | Self::TimedOut => ThrdStatus::Busy,
            Self::NoMem => ThrdStatus::NoMem,
        }
    }

    /// Host errno, when the failure came from the host library.
    #[must_use]
    pub const fn errno(self) -> Option<i32> {
        match self {
            Self::Native(errno) => Some(errno),
            _ => None,
        }
    }
}

impl From<ThrdError> for ThrdStatus {
    fn from(err: ThrdError) -> Self {
        err.status()
    }
}

pub type ThrdResult<T> = Result<T, ThrdError>;

/// Primitive family an operation belongs to. Used to key observation
/// counters and trace records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFamily {
    Once,
    Cond,
    Mutex,
    Thread,
    Tss,
    Time,
}

impl ApiFamily {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Once,
        Self::Cond,
        Self::Mutex,
        Self::Thread,
        Self::Tss,
        Self::Time,
    ];

    /// Dense index in `0..COUNT`.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Once => 0,
            Self::Cond => 1,
            Self::Mutex => 2,
            Self::Thread => 3,
            Self::Tss => 4,
            Self::Time => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Cond => "cond",
            Self::Mutex => "mutex",
            Self::Thread => "thread",
            Self::Tss => "tss",
            Self::Time => "time",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_emulation_header() {
        assert_eq!(ThrdStatus::Success.code(), 0);
        assert_eq!(ThrdStatus::Error.code(), 2);
        assert_eq!(ThrdStatus::Busy.code(), 3);
        assert_eq!(ThrdStatus::NoMem.code(), 4);
    }

    #[test]
    fn from_code_rejects_timeout_slot_and_unknowns() {
        for status in [
            ThrdStatus::Success,
            ThrdStatus::Error,
            ThrdStatus::Busy,
            ThrdStatus::NoMem,
        ] {
            assert_eq!(ThrdStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ThrdStatus::from_code(1), None);
        assert_eq!(ThrdStatus::from_code(-1), None);
        assert_eq!(ThrdStatus::from_code(5), None);
    }

    #[test]
    fn errors_collapse_onto_closed_code_set() {
        assert_eq!(ThrdError::InvalidArgument("mtx").status(), ThrdStatus::Error);
        assert_eq!(ThrdError::Native(22).status(), ThrdStatus::Error);
        assert_eq!(ThrdError::Busy.status(), ThrdStatus::Busy);
        assert_eq!(ThrdError::TimedOut.status(), ThrdStatus::Busy);
        assert_eq!(ThrdError::NoMem.status(), ThrdStatus::NoMem);
        assert_eq!(ThrdStatus::from(ThrdError::TimedOut), ThrdStatus::Busy);
    }

    #[test]
    fn errno_only_for_native_failures() {
        assert_eq!(ThrdError::Native(11).errno(), Some(11));
        assert_eq!(ThrdError::Busy.errno(), None);
        assert_eq!(ThrdError::InvalidArgument("xt").errno(), None);
    }

    #[test]
    fn status_of_result() {
        let ok: ThrdResult<u32> = Ok(7);
        let busy: ThrdResult<u32> = Err(ThrdError::Busy);
        assert_eq!(ThrdStatus::of(&ok), ThrdStatus::Success);
        assert_eq!(ThrdStatus::of(&busy), ThrdStatus::Busy);
    }

    #[test]
    fn error_messages_name_the_cause() {
        assert_eq!(
            ThrdError::InvalidArgument("mutex type").to_string(),
            "invalid argument: mutex type"
        );
        assert_eq!(
            ThrdError::Native(16).to_string(),
            "host threading call failed with errno 16"
        );
    }

    #[test]
    fn family_indices_are_dense() {
        for (i, family) in ApiFamily::ALL.iter().enumerate() {
            assert_eq!(family.index(), i);
        }
    }

    #[test]
    fn serde_names_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&ThrdStatus::NoMem).unwrap(),
            "\"nomem\""
        );
        assert_eq!(
            serde_json::to_string(&ApiFamily::Tss).unwrap(),
            "\"tss\""
        );
    }
}
