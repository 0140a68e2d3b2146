//! ABI layer for C11 threads (`thrd_*`).
//!
//! `thrd_create` hands the new thread a heap-allocated `(entry, arg)` pair.
//! Ownership moves exactly once: to the trampoline on a successful spawn,
//! back to the spawner on failure. The trampoline frees the pair before it
//! calls the entry, so a `thrd_exit` inside the entry leaks nothing.
//!
//! Entry points and `thrd_exit` use the `C-unwind` ABI because the host
//! implements thread exit as a forced unwind.

use std::alloc::{Layout, alloc};
use std::ffi::{c_int, c_void};
use std::ptr;

use c11threads_core::{ApiFamily, ThrdError, ThrdResult};

use crate::host::{check, last_errno, non_null};
use crate::observe;
use crate::time_abi::{read_xtime, to_timespec, xtime};

pub type thrd_t = libc::pthread_t;

/// Thread entry: `int (*)(void *)`.
pub type thrd_start_t = Option<unsafe extern "C-unwind" fn(*mut c_void) -> c_int>;

type HostStart = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

// Re-declared so the start routine and exit path carry the unwind-capable ABI.
unsafe extern "C" {
    #[link_name = "pthread_create"]
    fn host_pthread_create(
        native: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        start: HostStart,
        arg: *mut c_void,
    ) -> c_int;
}

unsafe extern "C-unwind" {
    #[link_name = "pthread_exit"]
    fn host_pthread_exit(value: *mut c_void) -> !;
}

struct ThrdParam {
    func: unsafe extern "C-unwind" fn(*mut c_void) -> c_int,
    arg: *mut c_void,
}

fn exit_value(code: c_int) -> *mut c_void {
    ptr::without_provenance_mut(code as isize as usize)
}

fn exit_code(value: *mut c_void) -> c_int {
    value.addr() as c_int
}

unsafe extern "C-unwind" fn thrd_trampoline(raw: *mut c_void) -> *mut c_void {
    // SAFETY: `raw` is the ThrdParam allocated by `thrd_create_impl`, handed
    // to exactly this thread.
    let ThrdParam { func, arg } = *unsafe { Box::from_raw(raw.cast::<ThrdParam>()) };
    // SAFETY: entry contract is the caller's.
    exit_value(unsafe { func(arg) })
}

/// Spawn `func(arg)` with host attributes `attr`, allocating the entry
/// package through `allocate`.
///
/// # Safety
/// `thr` must be null or writable; `attr` must be null or initialized;
/// `allocate` must return null or memory fit for `layout`.
unsafe fn spawn_with(
    thr: *mut thrd_t,
    attr: *const libc::pthread_attr_t,
    func: thrd_start_t,
    arg: *mut c_void,
    allocate: unsafe fn(Layout) -> *mut u8,
) -> ThrdResult<()> {
    non_null(thr, "thr")?;
    let func = func.ok_or(ThrdError::InvalidArgument("func"))?;

    // SAFETY: ThrdParam has non-zero size.
    let pack = unsafe { allocate(Layout::new::<ThrdParam>()) }.cast::<ThrdParam>();
    if pack.is_null() {
        return Err(ThrdError::NoMem);
    }
    // SAFETY: freshly allocated with ThrdParam's layout.
    unsafe { pack.write(ThrdParam { func, arg }) };

    // SAFETY: `thr` non-null; the trampoline takes ownership of `pack` on success.
    let rc = unsafe { host_pthread_create(thr, attr, thrd_trampoline, pack.cast()) };
    if rc != 0 {
        // SAFETY: spawn failed, so ownership never left this thread.
        drop(unsafe { Box::from_raw(pack) });
        return Err(ThrdError::Native(rc));
    }
    Ok(())
}

unsafe fn thrd_create_impl(thr: *mut thrd_t, func: thrd_start_t, arg: *mut c_void) -> ThrdResult<()> {
    // SAFETY: forwarded caller contract; default attributes.
    unsafe { spawn_with(thr, ptr::null(), func, arg, alloc) }
}

/// `thrd_create`: start `func(arg)` on a new thread and store its handle.
///
/// `thrd_nomem` if the entry package cannot be allocated, `thrd_error` if the
/// host refuses to spawn.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn thrd_create(thr: *mut thrd_t, func: thrd_start_t, arg: *mut c_void) -> c_int {
    observe::code(ApiFamily::Thread, "thrd_create", unsafe {
        thrd_create_impl(thr, func, arg)
    })
}

/// `thrd_current`.
#[unsafe(no_mangle)]
pub extern "C" fn thrd_current() -> thrd_t {
    observe::infallible(ApiFamily::Thread);
    // SAFETY: no preconditions.
    unsafe { libc::pthread_self() }
}

/// `thrd_detach`.
#[unsafe(no_mangle)]
pub extern "C" fn thrd_detach(thr: thrd_t) -> c_int {
    // SAFETY: handle validity is the host's contract.
    let result = check(unsafe { libc::pthread_detach(thr) });
    observe::code(ApiFamily::Thread, "thrd_detach", result)
}

/// `thrd_equal`: non-zero iff both handles denote the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn thrd_equal(a: thrd_t, b: thrd_t) -> c_int {
    observe::infallible(ApiFamily::Thread);
    // SAFETY: comparison only.
    unsafe { libc::pthread_equal(a, b) }
}

/// `thrd_exit`: terminate the calling thread with exit code `res`.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn thrd_exit(res: c_int) -> ! {
    observe::infallible(ApiFamily::Thread);
    // SAFETY: terminates the calling thread; no Rust frames with destructors
    // are live in this function.
    unsafe { host_pthread_exit(exit_value(res)) }
}

unsafe fn thrd_join_impl(thr: thrd_t, res: *mut c_int) -> ThrdResult<()> {
    let mut value: *mut c_void = ptr::null_mut();
    // SAFETY: `value` is a valid out-pointer.
    check(unsafe { libc::pthread_join(thr, &mut value) })?;
    if !res.is_null() {
        // SAFETY: non-null checked; caller supplies a writable int.
        unsafe { *res = exit_code(value) };
    }
    Ok(())
}

/// `thrd_join`: wait for `thr` and store its exit code into `*res` if
/// `res` is non-null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn thrd_join(thr: thrd_t, res: *mut c_int) -> c_int {
    observe::code(ApiFamily::Thread, "thrd_join", unsafe { thrd_join_impl(thr, res) })
}

unsafe fn thrd_sleep_impl(xt: *const xtime) -> ThrdResult<()> {
    // SAFETY: forwarded caller contract.
    let span = unsafe { read_xtime(xt, "xt") }?;
    if span.to_duration().is_none() {
        return Err(ThrdError::InvalidArgument("negative sleep"));
    }
    let mut req = to_timespec(span);
    // SAFETY: timespec is plain old data.
    let mut rem: libc::timespec = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: both pointers are valid for the call.
        if unsafe { libc::nanosleep(&req, &mut rem) } == 0 {
            return Ok(());
        }
        match last_errno() {
            libc::EINTR => req = rem,
            errno => return Err(ThrdError::Native(errno)),
        }
    }
}

/// `thrd_sleep`: suspend for at least the relative duration `*xt`.
/// Null or malformed `xt` is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn thrd_sleep(xt: *const xtime) {
    let _ = observe::finish(ApiFamily::Thread, "thrd_sleep", unsafe { thrd_sleep_impl(xt) });
}

/// `thrd_yield`.
#[unsafe(no_mangle)]
pub extern "C" fn thrd_yield() {
    observe::infallible(ApiFamily::Thread);
    // SAFETY: no preconditions.
    unsafe { libc::sched_yield() };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{thrd_error, thrd_success};
    use std::time::Instant;

    unsafe extern "C-unwind" fn return_arg_as_code(arg: *mut c_void) -> c_int {
        arg.addr() as c_int
    }

    unsafe extern "C-unwind" fn exit_early(_arg: *mut c_void) -> c_int {
        thrd_exit(-7)
    }

    unsafe fn no_memory(_layout: Layout) -> *mut u8 {
        ptr::null_mut()
    }

    fn spawn_code(result: ThrdResult<()>) -> c_int {
        observe::code(ApiFamily::Thread, "thrd_create", result)
    }

    #[test]
    fn package_allocation_failure_is_nomem() {
        let mut thr: thrd_t = 0 as thrd_t;
        let result = unsafe {
            spawn_with(&mut thr, ptr::null(), Some(return_arg_as_code), ptr::null_mut(), no_memory)
        };
        assert_eq!(result, Err(ThrdError::NoMem));
        assert_eq!(spawn_code(result), crate::thrd_nomem);
    }

    #[test]
    fn host_spawn_refusal_is_error() {
        let mut thr: thrd_t = 0 as thrd_t;
        let mut attr = std::mem::MaybeUninit::<libc::pthread_attr_t>::uninit();
        let result = unsafe {
            assert_eq!(libc::pthread_attr_init(attr.as_mut_ptr()), 0);
            // No address space can hold this stack.
            assert_eq!(libc::pthread_attr_setstacksize(attr.as_mut_ptr(), usize::MAX / 4), 0);
            let result = spawn_with(
                &mut thr,
                attr.as_ptr(),
                Some(return_arg_as_code),
                ptr::null_mut(),
                alloc,
            );
            libc::pthread_attr_destroy(attr.as_mut_ptr());
            result
        };
        assert!(matches!(result, Err(ThrdError::Native(rc)) if rc != 0), "{result:?}");
        assert_eq!(spawn_code(result), thrd_error);
    }

    #[test]
    fn exit_code_survives_pointer_round_trip() {
        for code in [0, 1, -1, 42, c_int::MAX, c_int::MIN] {
            assert_eq!(exit_code(exit_value(code)), code);
        }
    }

    #[test]
    fn entry_result_is_join_result() {
        let mut thr: thrd_t = 0 as thrd_t;
        let mut res: c_int = 0;
        unsafe {
            assert_eq!(
                thrd_create(&mut thr, Some(return_arg_as_code), ptr::without_provenance_mut(17)),
                thrd_success
            );
            assert_eq!(thrd_join(thr, &mut res), thrd_success);
        }
        assert_eq!(res, 17);
    }

    #[test]
    fn thrd_exit_code_reaches_joiner() {
        let mut thr: thrd_t = 0 as thrd_t;
        let mut res: c_int = 0;
        unsafe {
            assert_eq!(thrd_create(&mut thr, Some(exit_early), ptr::null_mut()), thrd_success);
            assert_eq!(thrd_join(thr, &mut res), thrd_success);
        }
        assert_eq!(res, -7);
    }

    #[test]
    fn null_handle_or_entry_is_error() {
        let mut thr: thrd_t = 0 as thrd_t;
        unsafe {
            assert_eq!(
                thrd_create(ptr::null_mut(), Some(return_arg_as_code), ptr::null_mut()),
                thrd_error
            );
            assert_eq!(thrd_create(&mut thr, None, ptr::null_mut()), thrd_error);
        }
    }

    #[test]
    fn current_equals_itself() {
        let me = thrd_current();
        assert_ne!(thrd_equal(me, thrd_current()), 0);
    }

    #[test]
    fn sleep_waits_at_least_requested() {
        let xt = xtime { sec: 0, nsec: 20_000_000 };
        let t0 = Instant::now();
        unsafe { thrd_sleep(&xt) };
        assert!(t0.elapsed() >= std::time::Duration::from_millis(20));
    }

    #[test]
    fn sleep_ignores_null_and_malformed() {
        let t0 = Instant::now();
        unsafe {
            thrd_sleep(ptr::null());
            thrd_sleep(&xtime { sec: 0, nsec: -1 });
            thrd_sleep(&xtime { sec: -3, nsec: 0 });
        }
        assert!(t0.elapsed() < std::time::Duration::from_secs(1));
        thrd_yield();
    }
}
