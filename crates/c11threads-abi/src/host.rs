//! Host return-value translation.

use std::ffi::c_int;

use c11threads_core::{ThrdError, ThrdResult};

/// Translate a pthread-style return value (0 or an errno).
pub(crate) fn check(rc: c_int) -> ThrdResult<()> {
    match rc {
        0 => Ok(()),
        libc::EBUSY => Err(ThrdError::Busy),
        libc::ETIMEDOUT => Err(ThrdError::TimedOut),
        libc::ENOMEM => Err(ThrdError::NoMem),
        other => Err(ThrdError::Native(other)),
    }
}

/// Translate the return value of a call that creates nothing. An ENOMEM
/// from such a call is a host failure, not a `thrd_nomem` result.
pub(crate) fn check_existing(rc: c_int) -> ThrdResult<()> {
    match check(rc) {
        Err(ThrdError::NoMem) => Err(ThrdError::Native(rc)),
        other => other,
    }
}

/// errno of the calling thread, for calls that report through it.
pub(crate) fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Reject a null pointer argument.
pub(crate) fn non_null<T>(ptr: *const T, what: &'static str) -> ThrdResult<()> {
    if ptr.is_null() {
        Err(ThrdError::InvalidArgument(what))
    } else {
        Ok(())
    }
}
