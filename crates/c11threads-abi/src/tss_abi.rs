//! ABI layer for thread-specific storage (`tss_*`).

use std::ffi::{c_int, c_void};

use c11threads_core::{ApiFamily, ThrdResult};

use crate::host::{check, check_existing, non_null};
use crate::observe;

pub type tss_t = libc::pthread_key_t;

/// Per-value destructor run at thread exit.
pub type tss_dtor_t = Option<unsafe extern "C" fn(*mut c_void)>;

/// Destructor passes guaranteed at thread exit.
pub const TSS_DTOR_ITERATIONS: c_int = 1;

unsafe fn tss_create_impl(key: *mut tss_t, dtor: tss_dtor_t) -> ThrdResult<()> {
    non_null(key, "key")?;
    // SAFETY: non-null checked; caller supplies a writable key.
    check(unsafe { libc::pthread_key_create(key, dtor) })
}

/// `tss_create`: allocate a key whose per-thread values start out null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tss_create(key: *mut tss_t, dtor: tss_dtor_t) -> c_int {
    observe::code(ApiFamily::Tss, "tss_create", unsafe {
        tss_create_impl(key, dtor)
    })
}

/// `tss_delete`. Destructors are not run for values still stored.
#[unsafe(no_mangle)]
pub extern "C" fn tss_delete(key: tss_t) {
    // SAFETY: key validity is the host's contract.
    let result = check(unsafe { libc::pthread_key_delete(key) });
    let _ = observe::finish(ApiFamily::Tss, "tss_delete", result);
}

/// `tss_get`: the calling thread's value for `key`, null if never set.
#[unsafe(no_mangle)]
pub extern "C" fn tss_get(key: tss_t) -> *mut c_void {
    observe::infallible(ApiFamily::Tss);
    // SAFETY: key validity is the host's contract.
    unsafe { libc::pthread_getspecific(key) }
}

/// `tss_set`: store `val` as the calling thread's value for `key`.
#[unsafe(no_mangle)]
pub extern "C" fn tss_set(key: tss_t, val: *mut c_void) -> c_int {
    // SAFETY: key validity is the host's contract.
    set_result(unsafe { libc::pthread_setspecific(key, val) })
}

fn set_result(rc: c_int) -> c_int {
    observe::code(ApiFamily::Tss, "tss_set", check_existing(rc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{thrd_error, thrd_success};

    #[test]
    fn fresh_key_reads_null_then_value() {
        let mut key: tss_t = 0;
        let mut slot = 5u32;
        unsafe {
            assert_eq!(tss_create(&mut key, None), thrd_success);
        }
        assert!(tss_get(key).is_null());
        let val = (&raw mut slot).cast::<c_void>();
        assert_eq!(tss_set(key, val), thrd_success);
        assert_eq!(tss_get(key), val);
        assert_eq!(tss_set(key, std::ptr::null_mut()), thrd_success);
        tss_delete(key);
    }

    #[test]
    fn set_out_of_memory_is_error_not_nomem() {
        assert_eq!(set_result(libc::ENOMEM), thrd_error);
        assert_eq!(set_result(libc::EINVAL), thrd_error);
        assert_eq!(set_result(0), thrd_success);
    }

    #[test]
    fn null_key_pointer_is_error() {
        assert_eq!(
            unsafe { tss_create(std::ptr::null_mut(), None) },
            thrd_error
        );
    }

    #[test]
    fn iterations_constant_is_at_least_one() {
        const { assert!(TSS_DTOR_ITERATIONS >= 1) };
    }
}
