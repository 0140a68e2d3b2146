//! Conformance scenarios run against the live `extern "C"` surface.
//!
//! Each scenario drives the ABI exactly as a C caller would (raw pointers,
//! `thrd_create` entry points, result codes) and reports the first deviation
//! as a message. Thread entry points never panic; they report through their
//! exit code or shared atomics instead.

use std::cell::UnsafeCell;
use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use c11threads_abi::mutex_abi::timedlock_with;
use c11threads_abi::observe;
use c11threads_abi::timedlock::PollTimedLock;
use c11threads_abi::{
    MTX_INITIALIZER_NP, ONCE_FLAG_INIT, call_once, cnd_broadcast, cnd_destroy, cnd_init,
    cnd_signal, cnd_t, cnd_timedwait, cnd_wait, mtx_destroy, mtx_init, mtx_lock, mtx_plain,
    mtx_t, mtx_timed, mtx_timedlock, mtx_trylock, mtx_try, mtx_unlock, once_flag, thrd_busy,
    thrd_create, thrd_error, thrd_exit, thrd_join, thrd_sleep, thrd_success, thrd_t, thrd_yield,
    tss_create, tss_delete, tss_get, tss_set, tss_t, xtime, xtime_get,
};
use c11threads_core::mutex::{MtxKind, MutexContractOp, MutexContractState, mutex_contract_transition};
use c11threads_core::time::TIME_UTC;
use c11threads_core::{ApiFamily, ThrdStatus, XTime};

pub type CheckResult = Result<(), String>;

/// One named conformance check.
pub struct Scenario {
    pub name: &'static str,
    pub api_family: ApiFamily,
    pub symbol: &'static str,
    pub description: &'static str,
    pub check: fn() -> CheckResult,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "mtx_init_valid_types",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_init",
        description: "every valid type initializes and destroys",
        check: mtx_init_valid_types,
    },
    Scenario {
        name: "mtx_init_invalid_types",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_init",
        description: "unknown or combined base types are rejected",
        check: mtx_init_invalid_types,
    },
    Scenario {
        name: "mtx_lock_excludes_second_thread",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_lock",
        description: "a second thread's lock blocks until unlock",
        check: mtx_lock_excludes_second_thread,
    },
    Scenario {
        name: "mtx_trylock_busy_on_contention",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_trylock",
        description: "trylock on a mutex held elsewhere is busy without blocking",
        check: mtx_trylock_busy_on_contention,
    },
    Scenario {
        name: "mtx_timedlock_expired_busy",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_timedlock",
        description: "past deadline on a held mutex is busy under both strategies",
        check: mtx_timedlock_expired_busy,
    },
    Scenario {
        name: "mtx_contract_agrees_with_abi",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_lock",
        description: "defined, non-blocking contract cells match live results",
        check: mtx_contract_agrees_with_abi,
    },
    Scenario {
        name: "mtx_counter_reaches_thread_count",
        api_family: ApiFamily::Mutex,
        symbol: "mtx_lock",
        description: "N threads incrementing under a mutex produce exactly N increments",
        check: mtx_counter_reaches_thread_count,
    },
    Scenario {
        name: "cnd_signal_wakes_waiter",
        api_family: ApiFamily::Cond,
        symbol: "cnd_signal",
        description: "a waiter resumes after signal",
        check: cnd_signal_wakes_waiter,
    },
    Scenario {
        name: "cnd_broadcast_wakes_all",
        api_family: ApiFamily::Cond,
        symbol: "cnd_broadcast",
        description: "every waiter resumes after broadcast",
        check: cnd_broadcast_wakes_all,
    },
    Scenario {
        name: "cnd_timedwait_honours_deadline",
        api_family: ApiFamily::Cond,
        symbol: "cnd_timedwait",
        description: "near-future deadline expires as busy after, not before, the deadline",
        check: cnd_timedwait_honours_deadline,
    },
    Scenario {
        name: "thrd_exit_code_joined",
        api_family: ApiFamily::Thread,
        symbol: "thrd_exit",
        description: "the thrd_exit code is observed by thrd_join",
        check: thrd_exit_code_joined,
    },
    Scenario {
        name: "tss_value_per_thread",
        api_family: ApiFamily::Tss,
        symbol: "tss_get",
        description: "a value set on one thread is invisible on another",
        check: tss_value_per_thread,
    },
    Scenario {
        name: "tss_dtor_runs_once",
        api_family: ApiFamily::Tss,
        symbol: "tss_create",
        description: "destructor runs exactly once with the thread's value",
        check: tss_dtor_runs_once,
    },
    Scenario {
        name: "call_once_concurrent",
        api_family: ApiFamily::Once,
        symbol: "call_once",
        description: "concurrent callers run the initializer exactly once",
        check: call_once_concurrent,
    },
    Scenario {
        name: "xtime_get_utc_only",
        api_family: ApiFamily::Time,
        symbol: "xtime_get",
        description: "UTC base fills the time point; other bases and null return 0",
        check: xtime_get_utc_only,
    },
];

/// Look up a scenario by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn describe(code: c_int) -> String {
    ThrdStatus::from_code(code).map_or_else(|| format!("code {code}"), |s| s.as_str().to_owned())
}

fn expect(what: &str, got: c_int, want: c_int) -> CheckResult {
    if got == want {
        Ok(())
    } else {
        Err(format!(
            "{what}: expected {}, got {}",
            describe(want),
            describe(got)
        ))
    }
}

fn ensure(cond: bool, what: impl FnOnce() -> String) -> CheckResult {
    if cond { Ok(()) } else { Err(what()) }
}

fn utc_now() -> Result<XTime, String> {
    let mut now = xtime::default();
    // SAFETY: `now` is a valid out-pointer.
    let base = unsafe { xtime_get(&mut now, TIME_UTC) };
    expect("xtime_get", base, TIME_UTC)?;
    Ok(now.into())
}

fn deadline_in(delta: Duration) -> Result<xtime, String> {
    utc_now()?
        .checked_add(delta)
        .map(xtime::from)
        .ok_or_else(|| "deadline overflow".to_string())
}

type Entry = unsafe extern "C-unwind" fn(*mut c_void) -> c_int;

fn spawn(entry: Entry, arg: *mut c_void) -> Result<thrd_t, String> {
    let mut thr = std::mem::MaybeUninit::<thrd_t>::uninit();
    // SAFETY: `thr` is a valid out-pointer; entries below honour the arg contract.
    expect("thrd_create", unsafe { thrd_create(thr.as_mut_ptr(), Some(entry), arg) }, thrd_success)?;
    // SAFETY: initialized by a successful thrd_create.
    Ok(unsafe { thr.assume_init() })
}

fn join(thr: thrd_t) -> Result<c_int, String> {
    let mut res: c_int = -1;
    // SAFETY: `res` is a valid out-pointer.
    expect("thrd_join", unsafe { thrd_join(thr, &mut res) }, thrd_success)?;
    Ok(res)
}

/// Mutex, condition and counters shared with spawned threads by address.
struct Shared {
    mtx: UnsafeCell<mtx_t>,
    cond: UnsafeCell<cnd_t>,
    // Guarded by `mtx`.
    ready: UnsafeCell<bool>,
    counter: UnsafeCell<usize>,
    entered: AtomicUsize,
    woken: AtomicUsize,
    acquired: AtomicBool,
    release: AtomicBool,
}

impl Shared {
    fn new(kind: c_int) -> Result<Box<Self>, String> {
        let shared = Box::new(Self {
            mtx: UnsafeCell::new(MTX_INITIALIZER_NP),
            cond: UnsafeCell::new(blank_cond()),
            ready: UnsafeCell::new(false),
            counter: UnsafeCell::new(0),
            entered: AtomicUsize::new(0),
            woken: AtomicUsize::new(0),
            acquired: AtomicBool::new(false),
            release: AtomicBool::new(false),
        });
        // SAFETY: both cells are owned by the box and not yet shared.
        unsafe {
            expect("mtx_init", mtx_init(shared.mtx.get(), kind), thrd_success)?;
            expect("cnd_init", cnd_init(shared.cond.get()), thrd_success)?;
        }
        Ok(shared)
    }

    fn mtx(&self) -> *mut mtx_t {
        self.mtx.get()
    }

    fn cond(&self) -> *mut cnd_t {
        self.cond.get()
    }

    fn arg(&self) -> *mut c_void {
        ptr::from_ref(self).cast_mut().cast()
    }

    /// # Safety
    /// `arg` must come from [`Shared::arg`] on a live `Shared`.
    unsafe fn from_arg<'a>(arg: *mut c_void) -> &'a Self {
        // SAFETY: forwarded caller contract.
        unsafe { &*arg.cast::<Self>() }
    }

    fn wait_until(&self, what: &str, done: impl Fn(&Self) -> bool) -> CheckResult {
        let t0 = Instant::now();
        while !done(self) {
            if t0.elapsed() > Duration::from_secs(10) {
                return Err(format!("timed out waiting for {what}"));
            }
            thrd_yield();
        }
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // SAFETY: no thread references `self` any more.
        unsafe {
            cnd_destroy(self.cond.get());
            mtx_destroy(self.mtx.get());
        }
    }
}

fn blank_cond() -> cnd_t {
    // SAFETY: an all-zero pthread_cond_t is overwritten by cnd_init before use.
    unsafe { std::mem::zeroed() }
}

// ---------------------------------------------------------------------------
// Thread entries
// ---------------------------------------------------------------------------

unsafe extern "C-unwind" fn hold_until_released(arg: *mut c_void) -> c_int {
    // SAFETY: spawned with Shared::arg.
    let s = unsafe { Shared::from_arg(arg) };
    // SAFETY: initialized mutex.
    if unsafe { mtx_lock(s.mtx()) } != thrd_success {
        return 1;
    }
    s.entered.fetch_add(1, Ordering::SeqCst);
    while !s.release.load(Ordering::Acquire) {
        thrd_yield();
    }
    // SAFETY: held by this thread.
    unsafe { mtx_unlock(s.mtx()) }
}

unsafe extern "C-unwind" fn lock_and_flag(arg: *mut c_void) -> c_int {
    // SAFETY: spawned with Shared::arg.
    let s = unsafe { Shared::from_arg(arg) };
    s.entered.fetch_add(1, Ordering::SeqCst);
    // SAFETY: initialized mutex.
    if unsafe { mtx_lock(s.mtx()) } != thrd_success {
        return 1;
    }
    s.acquired.store(true, Ordering::Release);
    // SAFETY: held by this thread.
    unsafe { mtx_unlock(s.mtx()) }
}

unsafe extern "C-unwind" fn wait_for_ready(arg: *mut c_void) -> c_int {
    // SAFETY: spawned with Shared::arg.
    let s = unsafe { Shared::from_arg(arg) };
    // SAFETY: initialized mutex and condition; `ready` is read under the mutex.
    unsafe {
        if mtx_lock(s.mtx()) != thrd_success {
            return 1;
        }
        s.entered.fetch_add(1, Ordering::SeqCst);
        while !*s.ready.get() {
            if cnd_wait(s.cond(), s.mtx()) != thrd_success {
                mtx_unlock(s.mtx());
                return 2;
            }
        }
        s.woken.fetch_add(1, Ordering::SeqCst);
        mtx_unlock(s.mtx())
    }
}

const INCREMENTS_PER_THREAD: usize = 500;

unsafe extern "C-unwind" fn increment_many(arg: *mut c_void) -> c_int {
    // SAFETY: spawned with Shared::arg.
    let s = unsafe { Shared::from_arg(arg) };
    for _ in 0..INCREMENTS_PER_THREAD {
        // SAFETY: `counter` is only touched under the mutex.
        unsafe {
            if mtx_lock(s.mtx()) != thrd_success {
                return 1;
            }
            *s.counter.get() += 1;
            if mtx_unlock(s.mtx()) != thrd_success {
                return 2;
            }
        }
    }
    0
}

unsafe extern "C-unwind" fn exit_with_arg(arg: *mut c_void) -> c_int {
    thrd_exit(arg.addr() as c_int)
}

/// Exit code 1 if the key read null here, 0 if not, -1 on tss_set failure.
unsafe extern "C-unwind" fn tss_probe(arg: *mut c_void) -> c_int {
    let key = arg.addr() as tss_t;
    let was_null = tss_get(key).is_null();
    if tss_set(key, ptr::without_provenance_mut(0xB0B)) != thrd_success {
        return -1;
    }
    c_int::from(was_null)
}

const TSS_MARKER: usize = 0x5150;
static TSS_DTOR_CALLS: AtomicUsize = AtomicUsize::new(0);
static TSS_DTOR_LAST: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn tss_record_dtor(value: *mut c_void) {
    TSS_DTOR_CALLS.fetch_add(1, Ordering::SeqCst);
    TSS_DTOR_LAST.store(value.addr(), Ordering::SeqCst);
}

unsafe extern "C-unwind" fn tss_set_marker(arg: *mut c_void) -> c_int {
    tss_set(arg.addr() as tss_t, ptr::without_provenance_mut(TSS_MARKER))
}

static ONCE_RUNS: AtomicUsize = AtomicUsize::new(0);
static ONCE_COMPLETED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn once_initializer() {
    ONCE_RUNS.fetch_add(1, Ordering::SeqCst);
    let pause = xtime {
        sec: 0,
        nsec: 20_000_000,
    };
    // SAFETY: valid relative duration.
    unsafe { thrd_sleep(&pause) };
    ONCE_COMPLETED.fetch_add(1, Ordering::SeqCst);
}

/// Exit code is the completed-initializer count seen right after call_once.
unsafe extern "C-unwind" fn once_caller(arg: *mut c_void) -> c_int {
    // SAFETY: spawned with a pointer to a live once_flag.
    unsafe { call_once(arg.cast::<once_flag>(), Some(once_initializer)) };
    ONCE_COMPLETED.load(Ordering::SeqCst) as c_int
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn mtx_init_valid_types() -> CheckResult {
    for kind in MtxKind::ALL {
        let mut m = Box::new(MTX_INITIALIZER_NP);
        // SAFETY: `m` is a live, exclusively owned mutex slot.
        unsafe {
            expect(
                &format!("mtx_init({})", kind.name()),
                mtx_init(&mut *m, kind.raw()),
                thrd_success,
            )?;
            mtx_destroy(&mut *m);
        }
    }
    Ok(())
}

fn mtx_init_invalid_types() -> CheckResult {
    for raw in [3, mtx_try | mtx_timed, 8, -1] {
        let mut m = Box::new(MTX_INITIALIZER_NP);
        // SAFETY: `m` is a live slot; a failed init leaves nothing to destroy.
        expect(
            &format!("mtx_init({raw})"),
            unsafe { mtx_init(&mut *m, raw) },
            thrd_error,
        )?;
    }
    // SAFETY: null is handled without dereference.
    expect("mtx_init(null)", unsafe { mtx_init(ptr::null_mut(), mtx_plain) }, thrd_error)
}

fn mtx_lock_excludes_second_thread() -> CheckResult {
    let s = Shared::new(mtx_plain)?;
    // SAFETY: initialized mutex.
    expect("mtx_lock", unsafe { mtx_lock(s.mtx()) }, thrd_success)?;
    let thr = spawn(lock_and_flag, s.arg())?;
    s.wait_until("second thread start", |s| s.entered.load(Ordering::SeqCst) == 1)?;
    // SAFETY: valid relative duration.
    unsafe { thrd_sleep(&xtime { sec: 0, nsec: 30_000_000 }) };
    let leaked = s.acquired.load(Ordering::Acquire);
    // SAFETY: held by this thread.
    expect("mtx_unlock", unsafe { mtx_unlock(s.mtx()) }, thrd_success)?;
    let code = join(thr)?;
    ensure(!leaked, || "second thread acquired a held mutex".to_string())?;
    expect("second thread exit", code, thrd_success)?;
    ensure(s.acquired.load(Ordering::Acquire), || {
        "second thread never acquired the mutex".to_string()
    })
}

/// Spawn a holder thread for `s.mtx` and wait until it owns the mutex.
fn hold_elsewhere(s: &Shared) -> Result<thrd_t, String> {
    let thr = spawn(hold_until_released, s.arg())?;
    s.wait_until("holder to lock", |s| s.entered.load(Ordering::SeqCst) == 1)?;
    Ok(thr)
}

fn release_holder(s: &Shared, thr: thrd_t) -> CheckResult {
    s.release.store(true, Ordering::Release);
    expect("holder exit", join(thr)?, thrd_success)
}

fn mtx_trylock_busy_on_contention() -> CheckResult {
    let s = Shared::new(mtx_try)?;
    let holder = hold_elsewhere(&s)?;
    let t0 = Instant::now();
    // SAFETY: initialized mutex.
    let rc = unsafe { mtx_trylock(s.mtx()) };
    let elapsed = t0.elapsed();
    release_holder(&s, holder)?;
    expect("mtx_trylock", rc, thrd_busy)?;
    ensure(elapsed < Duration::from_secs(1), || {
        format!("mtx_trylock blocked for {elapsed:?}")
    })
}

fn mtx_timedlock_expired_busy() -> CheckResult {
    let s = Shared::new(mtx_timed)?;
    let holder = hold_elsewhere(&s)?;
    let past = xtime { sec: 1, nsec: 0 };
    let t0 = Instant::now();
    // SAFETY: initialized mutex, valid deadline.
    let selected = unsafe { mtx_timedlock(s.mtx(), &past) };
    // SAFETY: as above.
    let polled = unsafe { timedlock_with::<PollTimedLock>(s.mtx(), &past) };
    let elapsed = t0.elapsed();
    release_holder(&s, holder)?;
    expect("mtx_timedlock(selected)", selected, thrd_busy)?;
    expect("mtx_timedlock(poll)", polled, thrd_busy)?;
    ensure(elapsed < Duration::from_secs(1), || {
        format!("expired timedlock took {elapsed:?}")
    })
}

/// `mtx_destroy` returns nothing; read its outcome from the mutex counters.
///
/// # Safety
/// `mtx` must point to an initialized, unlocked mutex.
unsafe fn observed_destroy(mtx: *mut mtx_t) -> c_int {
    let before = observe::snapshot(ApiFamily::Mutex);
    // SAFETY: forwarded caller contract.
    unsafe { mtx_destroy(mtx) };
    let after = observe::snapshot(ApiFamily::Mutex);
    if after.errors + after.busy == before.errors + before.busy {
        thrd_success
    } else {
        thrd_error
    }
}

/// Run `mtx_init` on a slot that is uninitialized or already destroyed.
fn live_init_cell(raw_kind: c_int, state: MutexContractState) -> Result<c_int, String> {
    let mut m = Box::new(MTX_INITIALIZER_NP);
    if state == MutexContractState::Destroyed {
        // SAFETY: `m` is a live, exclusively owned mutex slot.
        expect("setup mtx_init", unsafe { mtx_init(&mut *m, mtx_plain) }, thrd_success)?;
        // SAFETY: initialized just above.
        expect("setup mtx_destroy", unsafe { observed_destroy(&mut *m) }, thrd_success)?;
    }
    // SAFETY: as above.
    let rc = unsafe { mtx_init(&mut *m, raw_kind) };
    if rc == thrd_success {
        // SAFETY: initialized above and not locked.
        unsafe { mtx_destroy(&mut *m) };
    }
    Ok(rc)
}

fn live_contract_cell(
    raw_kind: c_int,
    state: MutexContractState,
    op: MutexContractOp,
) -> Result<c_int, String> {
    if matches!(
        state,
        MutexContractState::Uninitialized | MutexContractState::Destroyed
    ) {
        if op != MutexContractOp::Init {
            return Err(format!("{} on {} is not observable", op.name(), state.name()));
        }
        return live_init_cell(raw_kind, state);
    }

    // Re-initializing is only defined for a rejected kind; build a plain mutex to hold it.
    let s = Shared::new(MtxKind::from_raw(raw_kind).map_or(mtx_plain, MtxKind::raw))?;
    let mut held = 0usize;
    let mut holder = None;
    match state {
        MutexContractState::LockedBySelf => {
            // SAFETY: initialized mutex.
            expect("setup mtx_lock", unsafe { mtx_lock(s.mtx()) }, thrd_success)?;
            held += 1;
        }
        MutexContractState::LockedByOther => holder = Some(hold_elsewhere(&s)?),
        _ => {}
    }

    let past = xtime { sec: 1, nsec: 0 };
    // SAFETY: initialized mutex, valid deadline.
    let rc = unsafe {
        match op {
            MutexContractOp::Lock => mtx_lock(s.mtx()),
            MutexContractOp::TryLock => mtx_trylock(s.mtx()),
            MutexContractOp::TimedLockExpired => mtx_timedlock(s.mtx(), &past),
            MutexContractOp::Unlock => mtx_unlock(s.mtx()),
            MutexContractOp::Destroy => {
                let rc = observed_destroy(s.mtx());
                // `Shared` destroys its mutex on drop; give it a live one again.
                if rc == thrd_success {
                    expect("re-init mtx_init", mtx_init(s.mtx(), raw_kind), thrd_success)?;
                }
                rc
            }
            MutexContractOp::Init => mtx_init(s.mtx(), raw_kind),
        }
    };
    if rc == thrd_success {
        match op {
            MutexContractOp::Unlock => held = held.saturating_sub(1),
            MutexContractOp::Destroy | MutexContractOp::Init => held = 0,
            _ => held += 1,
        }
    }
    if let Some(thr) = holder {
        release_holder(&s, thr)?;
    }
    for _ in 0..held {
        // SAFETY: every counted acquisition belongs to this thread.
        expect("cleanup mtx_unlock", unsafe { mtx_unlock(s.mtx()) }, thrd_success)?;
    }
    Ok(rc)
}

/// Every cell the contract defines and that does not block is replayed
/// against the ABI; undefined cells are skipped.
fn mtx_contract_agrees_with_abi() -> CheckResult {
    let mut raw_kinds: Vec<c_int> = MtxKind::ALL.iter().map(|k| k.raw()).collect();
    raw_kinds.extend([3, 8]);

    let mut checked = 0usize;
    for raw in raw_kinds {
        for state in MutexContractState::ALL {
            for op in MutexContractOp::ALL {
                let expected = mutex_contract_transition(raw, state, op);
                if expected.undefined || expected.blocks {
                    continue;
                }
                // An invalid kind never yields a mutex to act on.
                if MtxKind::from_raw(raw).is_none() && op != MutexContractOp::Init {
                    continue;
                }
                let got = live_contract_cell(raw, state, op)?;
                expect(
                    &format!("raw {raw} {} {}", state.name(), op.name()),
                    got,
                    expected.status.code(),
                )?;
                checked += 1;
            }
        }
    }
    ensure(checked > 0, || "no contract cell was replayed".to_string())
}

fn mtx_counter_reaches_thread_count() -> CheckResult {
    const THREADS: usize = 8;
    let s = Shared::new(mtx_plain)?;
    let mut threads = Vec::with_capacity(THREADS);
    for _ in 0..THREADS {
        threads.push(spawn(increment_many, s.arg())?);
    }
    for thr in threads {
        expect("incrementer exit", join(thr)?, 0)?;
    }
    // SAFETY: every writer has been joined.
    let total = unsafe { *s.counter.get() };
    ensure(total == THREADS * INCREMENTS_PER_THREAD, || {
        format!(
            "counter {total}, expected {}",
            THREADS * INCREMENTS_PER_THREAD
        )
    })
}

fn open_gate(s: &Shared, notify: unsafe extern "C" fn(*mut cnd_t) -> c_int) -> CheckResult {
    // SAFETY: initialized mutex and condition; `ready` is written under the mutex.
    unsafe {
        expect("mtx_lock", mtx_lock(s.mtx()), thrd_success)?;
        *s.ready.get() = true;
        let rc = notify(s.cond());
        expect("mtx_unlock", mtx_unlock(s.mtx()), thrd_success)?;
        expect("notify", rc, thrd_success)
    }
}

fn run_waiters(waiters: usize, notify: unsafe extern "C" fn(*mut cnd_t) -> c_int) -> CheckResult {
    let s = Shared::new(mtx_plain)?;
    let mut threads = Vec::with_capacity(waiters);
    for _ in 0..waiters {
        threads.push(spawn(wait_for_ready, s.arg())?);
    }
    s.wait_until("waiters to block", |s| {
        s.entered.load(Ordering::SeqCst) == waiters
    })?;
    open_gate(&s, notify)?;
    // A single signal may wake only one waiter; later waiters still see `ready`.
    for _ in 1..waiters {
        // SAFETY: initialized condition.
        expect("cnd_signal", unsafe { cnd_signal(s.cond()) }, thrd_success)?;
    }
    for thr in threads {
        expect("waiter exit", join(thr)?, thrd_success)?;
    }
    let woken = s.woken.load(Ordering::SeqCst);
    ensure(woken == waiters, || format!("{woken} of {waiters} waiters resumed"))
}

fn cnd_signal_wakes_waiter() -> CheckResult {
    run_waiters(1, cnd_signal)
}

fn cnd_broadcast_wakes_all() -> CheckResult {
    run_waiters(4, cnd_broadcast)
}

fn cnd_timedwait_honours_deadline() -> CheckResult {
    let s = Shared::new(mtx_plain)?;
    let deadline = deadline_in(Duration::from_millis(50))?;
    let t0 = Instant::now();
    // SAFETY: initialized mutex and condition, valid deadline.
    let rc = unsafe {
        expect("mtx_lock", mtx_lock(s.mtx()), thrd_success)?;
        let mut rc = thrd_success;
        // Spurious wakeups report success; nobody signals, so keep waiting.
        while rc == thrd_success {
            rc = cnd_timedwait(s.cond(), s.mtx(), &deadline);
        }
        expect("mtx_unlock", mtx_unlock(s.mtx()), thrd_success)?;
        rc
    };
    let elapsed = t0.elapsed();
    expect("cnd_timedwait", rc, thrd_busy)?;
    let now = utc_now()?;
    ensure(XTime::from(deadline).has_passed(now), || {
        "cnd_timedwait returned before its deadline".to_string()
    })?;
    ensure(elapsed < Duration::from_secs(5), || {
        format!("cnd_timedwait overshot by {elapsed:?}")
    })
}

fn thrd_exit_code_joined() -> CheckResult {
    for code in [0, 7, -3] {
        let thr = spawn(exit_with_arg, ptr::without_provenance_mut(code as isize as usize))?;
        expect(&format!("thrd_exit({code})"), join(thr)?, code)?;
    }
    Ok(())
}

fn new_key(dtor: Option<unsafe extern "C" fn(*mut c_void)>) -> Result<tss_t, String> {
    let mut key = std::mem::MaybeUninit::<tss_t>::uninit();
    // SAFETY: `key` is a valid out-pointer.
    expect("tss_create", unsafe { tss_create(key.as_mut_ptr(), dtor) }, thrd_success)?;
    // SAFETY: initialized by a successful tss_create.
    Ok(unsafe { key.assume_init() })
}

fn tss_value_per_thread() -> CheckResult {
    let key = new_key(None)?;
    let mine = ptr::without_provenance_mut::<c_void>(0xA11CE);
    let result = (|| -> CheckResult {
        expect("tss_set", tss_set(key, mine), thrd_success)?;
        let thr = spawn(tss_probe, ptr::without_provenance_mut(key as usize))?;
        expect("other thread saw null", join(thr)?, 1)?;
        ensure(tss_get(key) == mine, || {
            "value changed by another thread".to_string()
        })
    })();
    tss_delete(key);
    result
}

fn tss_dtor_runs_once() -> CheckResult {
    let key = new_key(Some(tss_record_dtor))?;
    let before = TSS_DTOR_CALLS.load(Ordering::SeqCst);
    let result = (|| -> CheckResult {
        let thr = spawn(tss_set_marker, ptr::without_provenance_mut(key as usize))?;
        expect("tss_set on thread", join(thr)?, thrd_success)?;
        let calls = TSS_DTOR_CALLS.load(Ordering::SeqCst) - before;
        ensure(calls == 1, || format!("destructor ran {calls} times"))?;
        let last = TSS_DTOR_LAST.load(Ordering::SeqCst);
        ensure(last == TSS_MARKER, || {
            format!("destructor received {last:#x}")
        })
    })();
    tss_delete(key);
    result
}

fn call_once_concurrent() -> CheckResult {
    const CALLERS: usize = 6;
    let flag = Box::new(ONCE_FLAG_INIT);
    let arg = ptr::from_ref::<once_flag>(&flag).cast_mut().cast::<c_void>();
    let runs_before = ONCE_RUNS.load(Ordering::SeqCst);
    let completed_before = ONCE_COMPLETED.load(Ordering::SeqCst) as c_int;

    let mut threads = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        threads.push(spawn(once_caller, arg)?);
    }
    for thr in threads {
        let seen = join(thr)?;
        ensure(seen > completed_before, || {
            "a caller returned before the initializer completed".to_string()
        })?;
    }
    let runs = ONCE_RUNS.load(Ordering::SeqCst) - runs_before;
    ensure(runs == 1, || format!("initializer ran {runs} times"))?;
    ensure(flag.is_done(), || "flag not marked done".to_string())
}

fn xtime_get_utc_only() -> CheckResult {
    let before = utc_now()?;
    ensure(before.is_normalized(), || format!("unnormalized {before:?}"))?;
    let mut xt = xtime::default();
    // SAFETY: valid or null out-pointers.
    unsafe {
        expect("xtime_get(base 0)", xtime_get(&mut xt, 0), 0)?;
        expect("xtime_get(base 2)", xtime_get(&mut xt, 2), 0)?;
        expect("xtime_get(null)", xtime_get(ptr::null_mut(), TIME_UTC), 0)?;
    }
    let after = utc_now()?;
    ensure(after >= before, || "realtime clock went backwards".to_string())
}
