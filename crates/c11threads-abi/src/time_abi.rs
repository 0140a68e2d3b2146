//! ABI layer for `xtime` and `xtime_get`.

use std::ffi::{c_int, c_long};

use c11threads_core::time::TIME_UTC;
use c11threads_core::{ApiFamily, ThrdError, ThrdResult, XTime};

use crate::host::{last_errno, non_null};
use crate::observe;

/// C11 draft time point: seconds and nanoseconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct xtime {
    pub sec: libc::time_t,
    pub nsec: c_long,
}

impl From<XTime> for xtime {
    fn from(t: XTime) -> Self {
        Self {
            sec: t.sec as libc::time_t,
            nsec: t.nsec as c_long,
        }
    }
}

impl From<xtime> for XTime {
    fn from(t: xtime) -> Self {
        XTime::new(i64::from(t.sec), i64::from(t.nsec))
    }
}

/// Read the host realtime clock.
pub(crate) fn utc_now() -> ThrdResult<XTime> {
    // SAFETY: timespec is plain old data.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `ts` is a valid out-pointer for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if rc != 0 {
        return Err(ThrdError::Native(last_errno()));
    }
    Ok(XTime::new(i64::from(ts.tv_sec), i64::from(ts.tv_nsec)))
}

/// Host timespec for a validated time point.
pub(crate) fn to_timespec(t: XTime) -> libc::timespec {
    // SAFETY: timespec is plain old data; zeroing covers any padding fields.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    ts.tv_sec = t.sec as libc::time_t;
    ts.tv_nsec = t.nsec as _;
    ts
}

/// Copy a caller-supplied time point, rejecting null and unnormalized values.
pub(crate) unsafe fn read_xtime(xt: *const xtime, what: &'static str) -> ThrdResult<XTime> {
    non_null(xt, what)?;
    // SAFETY: non-null checked above; caller supplies a readable xtime.
    XTime::from(unsafe { *xt }).validated()
}

unsafe fn xtime_get_impl(xt: *mut xtime, base: c_int) -> ThrdResult<()> {
    non_null(xt, "xt")?;
    if base != TIME_UTC {
        return Err(ThrdError::InvalidArgument("time base"));
    }
    let now = utc_now()?;
    // SAFETY: non-null checked above; caller supplies a writable xtime.
    unsafe { *xt = now.into() };
    Ok(())
}

/// `xtime_get`: store the current UTC time in `*xt`.
///
/// Returns `base` on success and `0` for any other base, a null `xt`, or a
/// clock failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn xtime_get(xt: *mut xtime, base: c_int) -> c_int {
    match observe::finish(ApiFamily::Time, "xtime_get", unsafe { xtime_get_impl(xt, base) }) {
        Ok(()) => base,
        Err(_) => 0,
    }
}
