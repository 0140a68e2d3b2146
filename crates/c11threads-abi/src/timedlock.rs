//! Strategies behind `mtx_timedlock`.
//!
//! Both strategies take an absolute UTC deadline and report expiry as
//! [`ThrdError::TimedOut`]. The build picks one through
//! [`SelectedTimedLock`]; the other stays callable through
//! [`timedlock_with`](crate::mutex_abi::timedlock_with) where the host allows.

use c11threads_core::config::TimedLockStrategy;
use c11threads_core::{ThrdError, ThrdResult, XTime};

use crate::mutex_abi::{mtx_t, try_lock_raw};
use crate::observe;
use crate::time_abi::utc_now;

/// Acquire a mutex before an absolute deadline.
pub trait TimedLock {
    const STRATEGY: TimedLockStrategy;

    /// # Safety
    /// `mtx` must point to an initialized mutex.
    unsafe fn lock_until(mtx: *mut mtx_t, deadline: XTime) -> ThrdResult<()>;
}

/// Delegates to the host's `pthread_mutex_timedlock`.
#[cfg(not(any(target_vendor = "apple", target_os = "netbsd", target_os = "cygwin")))]
pub struct NativeTimedLock;

#[cfg(not(any(target_vendor = "apple", target_os = "netbsd", target_os = "cygwin")))]
impl TimedLock for NativeTimedLock {
    const STRATEGY: TimedLockStrategy = TimedLockStrategy::Native;

    unsafe fn lock_until(mtx: *mut mtx_t, deadline: XTime) -> ThrdResult<()> {
        let ts = crate::time_abi::to_timespec(deadline);
        // SAFETY: caller guarantees `mtx`; `ts` lives across the call.
        crate::host::check(unsafe { libc::pthread_mutex_timedlock(mtx, &ts) })
    }
}

/// Trylock, then yield, until acquired or the wall clock reaches the deadline.
pub struct PollTimedLock;

impl TimedLock for PollTimedLock {
    const STRATEGY: TimedLockStrategy = TimedLockStrategy::Poll;

    unsafe fn lock_until(mtx: *mut mtx_t, deadline: XTime) -> ThrdResult<()> {
        loop {
            // SAFETY: caller guarantees `mtx`.
            match unsafe { try_lock_raw(mtx) } {
                Err(ThrdError::Busy) => {}
                other => return other,
            }
            if deadline.has_passed(utc_now()?) {
                return Err(ThrdError::TimedOut);
            }
            observe::note_poll_retry();
            // SAFETY: no preconditions.
            unsafe { libc::sched_yield() };
        }
    }
}

#[cfg(any(
    feature = "poll-timedlock",
    target_vendor = "apple",
    target_os = "netbsd",
    target_os = "cygwin"
))]
pub type SelectedTimedLock = PollTimedLock;

#[cfg(not(any(
    feature = "poll-timedlock",
    target_vendor = "apple",
    target_os = "netbsd",
    target_os = "cygwin"
)))]
pub type SelectedTimedLock = NativeTimedLock;
