#![cfg(unix)]

use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use c11threads_abi::observe;
use c11threads_abi::{
    thrd_create, thrd_current, thrd_detach, thrd_equal, thrd_error, thrd_exit, thrd_join,
    thrd_sleep, thrd_success, thrd_t, thrd_yield, xtime,
};
use c11threads_core::ApiFamily;

static TEST_GUARD_HELD: AtomicBool = AtomicBool::new(false);

struct TestGuard;

impl Drop for TestGuard {
    fn drop(&mut self) {
        TEST_GUARD_HELD.store(false, Ordering::Release);
    }
}

fn acquire_test_guard() -> TestGuard {
    loop {
        if TEST_GUARD_HELD
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return TestGuard;
        }
        std::thread::yield_now();
    }
}

unsafe extern "C-unwind" fn add_one(arg: *mut c_void) -> c_int {
    let counter = unsafe { &*arg.cast::<AtomicUsize>() };
    counter.fetch_add(1, Ordering::SeqCst);
    0
}

unsafe extern "C-unwind" fn exit_with_arg(arg: *mut c_void) -> c_int {
    thrd_exit(arg.addr() as c_int)
}

unsafe extern "C-unwind" fn report_self(arg: *mut c_void) -> c_int {
    unsafe { arg.cast::<thrd_t>().write(thrd_current()) };
    0
}

unsafe extern "C-unwind" fn sleep_then_flag(arg: *mut c_void) -> c_int {
    let xt = xtime {
        sec: 0,
        nsec: 10_000_000,
    };
    unsafe { thrd_sleep(&xt) };
    let done = unsafe { &*arg.cast::<AtomicBool>() };
    done.store(true, Ordering::Release);
    0
}

fn spawn(func: unsafe extern "C-unwind" fn(*mut c_void) -> c_int, arg: *mut c_void) -> thrd_t {
    let mut thr = std::mem::MaybeUninit::<thrd_t>::uninit();
    assert_eq!(
        unsafe { thrd_create(thr.as_mut_ptr(), Some(func), arg) },
        thrd_success
    );
    unsafe { thr.assume_init() }
}

#[test]
fn joined_threads_each_run_once() {
    let _guard = acquire_test_guard();
    const THREADS: usize = 16;
    let counter = AtomicUsize::new(0);
    let arg = ptr::from_ref(&counter).cast_mut().cast::<c_void>();
    let handles: Vec<thrd_t> = (0..THREADS).map(|_| spawn(add_one, arg)).collect();
    for h in handles {
        let mut res: c_int = -1;
        assert_eq!(unsafe { thrd_join(h, &mut res) }, thrd_success);
        assert_eq!(res, 0);
    }
    assert_eq!(counter.load(Ordering::SeqCst), THREADS);
}

#[test]
fn exit_code_is_observed_by_join() {
    let _guard = acquire_test_guard();
    for code in [0, 3, -1, 255] {
        let h = spawn(exit_with_arg, ptr::without_provenance_mut(code as isize as usize));
        let mut res: c_int = 0;
        assert_eq!(unsafe { thrd_join(h, &mut res) }, thrd_success);
        assert_eq!(res, code);
    }
}

#[test]
fn join_with_null_result_pointer() {
    let _guard = acquire_test_guard();
    let counter = AtomicUsize::new(0);
    let arg = ptr::from_ref(&counter).cast_mut().cast::<c_void>();
    let h = spawn(add_one, arg);
    assert_eq!(unsafe { thrd_join(h, ptr::null_mut()) }, thrd_success);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn child_sees_its_own_handle() {
    let _guard = acquire_test_guard();
    let mut seen = std::mem::MaybeUninit::<thrd_t>::uninit();
    let h = spawn(report_self, seen.as_mut_ptr().cast());
    assert_eq!(unsafe { thrd_join(h, ptr::null_mut()) }, thrd_success);
    let seen = unsafe { seen.assume_init() };
    assert_ne!(thrd_equal(seen, h), 0);
    assert_eq!(thrd_equal(seen, thrd_current()), 0);
}

#[test]
fn detached_thread_runs_to_completion() {
    let _guard = acquire_test_guard();
    static DONE: AtomicBool = AtomicBool::new(false);
    let h = spawn(sleep_then_flag, ptr::from_ref(&DONE).cast_mut().cast());
    assert_eq!(thrd_detach(h), thrd_success);
    let t0 = Instant::now();
    while !DONE.load(Ordering::Acquire) {
        assert!(t0.elapsed() < Duration::from_secs(10));
        thrd_yield();
    }
}

#[test]
fn invalid_create_arguments_count_as_errors() {
    let _guard = acquire_test_guard();
    observe::reset_counters_for_tests();
    let mut thr = std::mem::MaybeUninit::<thrd_t>::uninit();
    unsafe {
        assert_eq!(
            thrd_create(ptr::null_mut(), Some(add_one), ptr::null_mut()),
            thrd_error
        );
        assert_eq!(thrd_create(thr.as_mut_ptr(), None, ptr::null_mut()), thrd_error);
    }
    let snap = observe::snapshot(ApiFamily::Thread);
    assert_eq!(snap.calls, 2);
    assert_eq!(snap.errors, 2);
}
