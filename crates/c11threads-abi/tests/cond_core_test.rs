#![cfg(unix)]

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use c11threads_abi::{
    MTX_INITIALIZER_NP, cnd_broadcast, cnd_destroy, cnd_init, cnd_signal, cnd_t, cnd_timedwait,
    cnd_wait, mtx_destroy, mtx_init, mtx_lock, mtx_plain, mtx_t, mtx_unlock, thrd_busy,
    thrd_success, xtime, xtime_get,
};
use c11threads_core::XTime;
use c11threads_core::time::TIME_UTC;

/// A predicate protected by a C11 mutex and condition pair.
struct Gate {
    mtx: UnsafeCell<mtx_t>,
    cond: UnsafeCell<cnd_t>,
    open: UnsafeCell<bool>,
    woken: UnsafeCell<usize>,
}

// SAFETY: `open` and `woken` are only touched while holding `mtx`.
unsafe impl Sync for Gate {}
unsafe impl Send for Gate {}

impl Gate {
    fn new() -> Arc<Self> {
        let gate = Arc::new(Self {
            mtx: UnsafeCell::new(MTX_INITIALIZER_NP),
            cond: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
            open: UnsafeCell::new(false),
            woken: UnsafeCell::new(0),
        });
        unsafe {
            assert_eq!(mtx_init(gate.mtx.get(), mtx_plain), thrd_success);
            assert_eq!(cnd_init(gate.cond.get()), thrd_success);
        }
        gate
    }

    /// Block until `open`, re-checking after every wakeup.
    fn wait_open(&self) {
        unsafe {
            assert_eq!(mtx_lock(self.mtx.get()), thrd_success);
            while !*self.open.get() {
                assert_eq!(cnd_wait(self.cond.get(), self.mtx.get()), thrd_success);
            }
            *self.woken.get() += 1;
            assert_eq!(mtx_unlock(self.mtx.get()), thrd_success);
        }
    }

    fn open_with(&self, notify: unsafe extern "C" fn(*mut cnd_t) -> i32) {
        unsafe {
            assert_eq!(mtx_lock(self.mtx.get()), thrd_success);
            *self.open.get() = true;
            assert_eq!(notify(self.cond.get()), thrd_success);
            assert_eq!(mtx_unlock(self.mtx.get()), thrd_success);
        }
    }

    fn woken(&self) -> usize {
        unsafe {
            assert_eq!(mtx_lock(self.mtx.get()), thrd_success);
            let n = *self.woken.get();
            assert_eq!(mtx_unlock(self.mtx.get()), thrd_success);
            n
        }
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        unsafe {
            cnd_destroy(self.cond.get());
            mtx_destroy(self.mtx.get());
        }
    }
}

fn deadline_in(delta: Duration) -> xtime {
    let mut now = xtime::default();
    assert_eq!(unsafe { xtime_get(&mut now, TIME_UTC) }, TIME_UTC);
    XTime::from(now).checked_add(delta).unwrap().into()
}

fn utc_now() -> XTime {
    let mut now = xtime::default();
    assert_eq!(unsafe { xtime_get(&mut now, TIME_UTC) }, TIME_UTC);
    now.into()
}

#[test]
fn waiter_resumes_after_signal() {
    let gate = Gate::new();
    let waiter = {
        let gate = Arc::clone(&gate);
        std::thread::spawn(move || gate.wait_open())
    };
    std::thread::sleep(Duration::from_millis(20));
    gate.open_with(cnd_signal);
    waiter.join().unwrap();
    assert_eq!(gate.woken(), 1);
}

#[test]
fn broadcast_wakes_every_waiter() {
    const WAITERS: usize = 4;
    let gate = Gate::new();
    let waiters: Vec<_> = (0..WAITERS)
        .map(|_| {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.wait_open())
        })
        .collect();
    std::thread::sleep(Duration::from_millis(20));
    gate.open_with(cnd_broadcast);
    for w in waiters {
        w.join().unwrap();
    }
    assert_eq!(gate.woken(), WAITERS);
}

#[test]
fn signal_without_waiters_is_noop() {
    let gate = Gate::new();
    unsafe {
        assert_eq!(cnd_signal(gate.cond.get()), thrd_success);
        assert_eq!(cnd_broadcast(gate.cond.get()), thrd_success);
    }
}

#[test]
fn timedwait_expires_after_deadline_not_before() {
    let gate = Gate::new();
    let deadline = deadline_in(Duration::from_millis(50));
    let t0 = Instant::now();
    unsafe {
        assert_eq!(mtx_lock(gate.mtx.get()), thrd_success);
        let mut rc = thrd_success;
        // Spurious wakeups return success; keep waiting until the deadline.
        while rc == thrd_success {
            rc = cnd_timedwait(gate.cond.get(), gate.mtx.get(), &deadline);
        }
        assert_eq!(rc, thrd_busy);
        assert_eq!(mtx_unlock(gate.mtx.get()), thrd_success);
    }
    assert!(XTime::from(deadline).has_passed(utc_now()));
    assert!(t0.elapsed() < Duration::from_secs(5));
}

#[test]
fn timedwait_returns_success_when_signalled_in_time() {
    let gate = Gate::new();
    let signaller = {
        let gate = Arc::clone(&gate);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            gate.open_with(cnd_signal);
        })
    };
    let deadline = deadline_in(Duration::from_secs(10));
    unsafe {
        assert_eq!(mtx_lock(gate.mtx.get()), thrd_success);
        while !*gate.open.get() {
            assert_eq!(
                cnd_timedwait(gate.cond.get(), gate.mtx.get(), &deadline),
                thrd_success
            );
        }
        assert_eq!(mtx_unlock(gate.mtx.get()), thrd_success);
    }
    signaller.join().unwrap();
}
