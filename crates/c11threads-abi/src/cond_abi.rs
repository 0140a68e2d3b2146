//! ABI layer for C11 condition variables (`cnd_*`).

use std::ffi::c_int;

use c11threads_core::{ApiFamily, ThrdResult};

use crate::host::{check, non_null};
use crate::mutex_abi::mtx_t;
use crate::observe;
use crate::time_abi::{read_xtime, to_timespec, xtime};

pub type cnd_t = libc::pthread_cond_t;

/// Null-check `cond`, then hand it to a single-argument host call.
fn forward(cond: *mut cnd_t, host: unsafe extern "C" fn(*mut cnd_t) -> c_int) -> ThrdResult<()> {
    non_null(cond, "cond")?;
    // SAFETY: non-null checked; caller supplies an initialized condition.
    check(unsafe { host(cond) })
}

unsafe fn timedwait_impl(cond: *mut cnd_t, mtx: *mut mtx_t, xt: *const xtime) -> ThrdResult<()> {
    non_null(cond, "cond")?;
    non_null(mtx, "mtx")?;
    // SAFETY: forwarded caller contract.
    let deadline = unsafe { read_xtime(xt, "xt") }?;
    let ts = to_timespec(deadline);
    // SAFETY: non-null checked; `ts` lives across the call.
    check(unsafe { libc::pthread_cond_timedwait(cond, mtx, &ts) })
}

/// `cnd_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_init(cond: *mut cnd_t) -> c_int {
    let result = non_null(cond, "cond").and_then(|()| {
        // SAFETY: non-null checked.
        check(unsafe { libc::pthread_cond_init(cond, std::ptr::null()) })
    });
    observe::code(ApiFamily::Cond, "cnd_init", result)
}

/// `cnd_destroy`. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_destroy(cond: *mut cnd_t) {
    let result = forward(cond, libc::pthread_cond_destroy);
    let _ = observe::finish(ApiFamily::Cond, "cnd_destroy", result);
}

/// `cnd_signal`: wake at least one waiter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_signal(cond: *mut cnd_t) -> c_int {
    let result = forward(cond, libc::pthread_cond_signal);
    observe::code(ApiFamily::Cond, "cnd_signal", result)
}

/// `cnd_broadcast`: wake every waiter.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_broadcast(cond: *mut cnd_t) -> c_int {
    let result = forward(cond, libc::pthread_cond_broadcast);
    observe::code(ApiFamily::Cond, "cnd_broadcast", result)
}

/// `cnd_wait`: release `*mtx`, sleep until woken, re-acquire.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_wait(cond: *mut cnd_t, mtx: *mut mtx_t) -> c_int {
    let result = non_null(cond, "cond")
        .and_then(|()| non_null(mtx, "mtx"))
        .and_then(|()| {
            // SAFETY: both non-null; caller holds `mtx`.
            check(unsafe { libc::pthread_cond_wait(cond, mtx) })
        });
    observe::code(ApiFamily::Cond, "cnd_wait", result)
}

/// `cnd_timedwait`: `cnd_wait` bounded by the absolute UTC deadline `*xt`.
/// Expiry reports `thrd_busy`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cnd_timedwait(
    cond: *mut cnd_t,
    mtx: *mut mtx_t,
    xt: *const xtime,
) -> c_int {
    observe::code(ApiFamily::Cond, "cnd_timedwait", unsafe {
        timedwait_impl(cond, mtx, xt)
    })
}
