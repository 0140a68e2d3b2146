//! ABI layer for C11 mutexes (`mtx_*`).
//!
//! `mtx_t` is the host `pthread_mutex_t`. Recursive types select the host
//! recursive kind, every other type the host default kind; the plain/try/timed
//! distinction is only validated, never stored.

use std::ffi::c_int;

use c11threads_core::mutex::{self, MtxKind};
use c11threads_core::{ApiFamily, ThrdError, ThrdResult};

use crate::host::{check, non_null};
use crate::observe;
use crate::time_abi::{read_xtime, xtime};
use crate::timedlock::{SelectedTimedLock, TimedLock};

pub type mtx_t = libc::pthread_mutex_t;

pub const mtx_plain: c_int = mutex::MTX_PLAIN;
pub const mtx_try: c_int = mutex::MTX_TRY;
pub const mtx_timed: c_int = mutex::MTX_TIMED;
pub const mtx_recursive: c_int = mutex::MTX_RECURSIVE;

/// Static initializer for a default-kind mutex, straight from the host.
pub const MTX_INITIALIZER_NP: mtx_t = libc::PTHREAD_MUTEX_INITIALIZER;

unsafe fn init_raw(mtx: *mut mtx_t, kind: MtxKind) -> ThrdResult<()> {
    // SAFETY: pthread_mutexattr_t is plain old data until initialized below.
    let mut attr: libc::pthread_mutexattr_t = unsafe { std::mem::zeroed() };
    // SAFETY: `attr` is a valid out-pointer.
    check(unsafe { libc::pthread_mutexattr_init(&mut attr) })?;

    let host_kind = if kind.recursive {
        libc::PTHREAD_MUTEX_RECURSIVE
    } else {
        libc::PTHREAD_MUTEX_DEFAULT
    };
    // SAFETY: `attr` was initialized above; `mtx` is non-null (checked by caller).
    let rc = unsafe {
        match libc::pthread_mutexattr_settype(&mut attr, host_kind) {
            0 => libc::pthread_mutex_init(mtx, &attr),
            err => err,
        }
    };
    // SAFETY: `attr` is initialized and no longer needed.
    unsafe { libc::pthread_mutexattr_destroy(&mut attr) };
    check(rc)
}

unsafe fn mtx_init_impl(mtx: *mut mtx_t, type_: c_int) -> ThrdResult<()> {
    non_null(mtx, "mtx")?;
    let kind = mutex::parse_mtx_type(type_)?;
    // SAFETY: non-null checked above.
    unsafe { init_raw(mtx, kind) }
}

/// Non-blocking acquisition: `Busy` on contention, `Native` for any other
/// host failure.
pub(crate) unsafe fn try_lock_raw(mtx: *mut mtx_t) -> ThrdResult<()> {
    // SAFETY: caller passes a non-null, initialized mutex.
    match unsafe { libc::pthread_mutex_trylock(mtx) } {
        0 => Ok(()),
        libc::EBUSY => Err(ThrdError::Busy),
        other => Err(ThrdError::Native(other)),
    }
}

unsafe fn timedlock_impl<S: TimedLock>(mtx: *mut mtx_t, xt: *const xtime) -> ThrdResult<()> {
    non_null(mtx, "mtx")?;
    // SAFETY: forwarded caller contract.
    let deadline = unsafe { read_xtime(xt, "xt") }?;
    // SAFETY: non-null checked above.
    unsafe { S::lock_until(mtx, deadline) }
}

/// `mtx_timedlock` through an explicit strategy instead of the build default.
#[doc(hidden)]
pub unsafe fn timedlock_with<S: TimedLock>(mtx: *mut mtx_t, xt: *const xtime) -> c_int {
    observe::code(ApiFamily::Mutex, "mtx_timedlock", unsafe {
        timedlock_impl::<S>(mtx, xt)
    })
}

/// `mtx_init`: initialize `*mtx` as a mutex of `type_`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_init(mtx: *mut mtx_t, type_: c_int) -> c_int {
    observe::code(ApiFamily::Mutex, "mtx_init", unsafe {
        mtx_init_impl(mtx, type_)
    })
}

/// `mtx_destroy`. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_destroy(mtx: *mut mtx_t) {
    let result = non_null(mtx, "mtx").and_then(|()| {
        // SAFETY: non-null checked.
        check(unsafe { libc::pthread_mutex_destroy(mtx) })
    });
    let _ = observe::finish(ApiFamily::Mutex, "mtx_destroy", result);
}

/// `mtx_lock`: block until the calling thread owns `*mtx`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_lock(mtx: *mut mtx_t) -> c_int {
    let result = non_null(mtx, "mtx").and_then(|()| {
        // SAFETY: non-null checked.
        check(unsafe { libc::pthread_mutex_lock(mtx) })
    });
    observe::code(ApiFamily::Mutex, "mtx_lock", result)
}

/// `mtx_trylock`: acquire without blocking, `thrd_busy` if held elsewhere.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_trylock(mtx: *mut mtx_t) -> c_int {
    let result = non_null(mtx, "mtx").and_then(|()| {
        // SAFETY: non-null checked.
        unsafe { try_lock_raw(mtx) }
    });
    observe::code(ApiFamily::Mutex, "mtx_trylock", result)
}

/// `mtx_timedlock`: block at most until the absolute UTC deadline `*xt`.
/// Expiry reports `thrd_busy`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_timedlock(mtx: *mut mtx_t, xt: *const xtime) -> c_int {
    unsafe { timedlock_with::<SelectedTimedLock>(mtx, xt) }
}

/// `mtx_unlock`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mtx_unlock(mtx: *mut mtx_t) -> c_int {
    let result = non_null(mtx, "mtx").and_then(|()| {
        // SAFETY: non-null checked.
        check(unsafe { libc::pthread_mutex_unlock(mtx) })
    });
    observe::code(ApiFamily::Mutex, "mtx_unlock", result)
}
