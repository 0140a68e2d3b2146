//! Uncontended fast-path benchmarks for the threads facade.

use std::ffi::c_void;
use std::ptr;

use c11threads_abi::mutex_abi::timedlock_with;
use c11threads_abi::timedlock::{PollTimedLock, SelectedTimedLock};
use c11threads_abi::{
    MTX_INITIALIZER_NP, ONCE_FLAG_INIT, call_once, mtx_destroy, mtx_init, mtx_lock, mtx_plain,
    mtx_recursive, mtx_t, mtx_timed, mtx_trylock, mtx_unlock, thrd_success, tss_create,
    tss_delete, tss_get, tss_set, tss_t, xtime, xtime_get,
};
use c11threads_core::time::TIME_UTC;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn new_mutex(kind: i32) -> Box<mtx_t> {
    let mut m = Box::new(MTX_INITIALIZER_NP);
    assert_eq!(unsafe { mtx_init(&mut *m, kind) }, thrd_success);
    m
}

fn bench_lock_unlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("mtx_lock_unlock");
    for (name, kind) in [("plain", mtx_plain), ("recursive", mtx_plain | mtx_recursive)] {
        let mut m = new_mutex(kind);
        let mp: *mut mtx_t = &mut *m;
        group.bench_with_input(BenchmarkId::new("uncontended", name), &mp, |b, &mp| {
            b.iter(|| unsafe {
                mtx_lock(mp);
                mtx_unlock(mp);
            });
        });
        unsafe { mtx_destroy(mp) };
    }
    group.finish();
}

fn bench_trylock(c: &mut Criterion) {
    let mut m = new_mutex(mtx_plain);
    let mp: *mut mtx_t = &mut *m;
    c.bench_function("mtx_trylock_unlock", |b| {
        b.iter(|| unsafe {
            criterion::black_box(mtx_trylock(mp));
            mtx_unlock(mp);
        });
    });
    unsafe { mtx_destroy(mp) };
}

fn bench_timedlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("mtx_timedlock_free");
    let mut m = new_mutex(mtx_timed);
    let mp: *mut mtx_t = &mut *m;
    let far = xtime {
        sec: 2_000_000_000,
        nsec: 0,
    };
    group.bench_function("selected", |b| {
        b.iter(|| unsafe {
            criterion::black_box(timedlock_with::<SelectedTimedLock>(mp, &far));
            mtx_unlock(mp);
        });
    });
    group.bench_function("poll", |b| {
        b.iter(|| unsafe {
            criterion::black_box(timedlock_with::<PollTimedLock>(mp, &far));
            mtx_unlock(mp);
        });
    });
    group.finish();
    unsafe { mtx_destroy(mp) };
}

fn bench_tss(c: &mut Criterion) {
    let mut key = std::mem::MaybeUninit::<tss_t>::uninit();
    assert_eq!(unsafe { tss_create(key.as_mut_ptr(), None) }, thrd_success);
    let key = unsafe { key.assume_init() };
    let value = ptr::without_provenance_mut::<c_void>(0x10);

    let mut group = c.benchmark_group("tss");
    group.bench_function("set", |b| {
        b.iter(|| criterion::black_box(tss_set(key, value)));
    });
    group.bench_function("get", |b| {
        b.iter(|| criterion::black_box(tss_get(key)));
    });
    group.finish();
    tss_delete(key);
}

unsafe extern "C" fn noop_init() {}

fn bench_call_once_done(c: &mut Criterion) {
    let flag = Box::new(ONCE_FLAG_INIT);
    let fp = ptr::from_ref(&*flag).cast_mut();
    unsafe { call_once(fp, Some(noop_init)) };
    c.bench_function("call_once_done", |b| {
        b.iter(|| unsafe { call_once(fp, Some(noop_init)) });
    });
}

fn bench_xtime_get(c: &mut Criterion) {
    let mut xt = xtime::default();
    c.bench_function("xtime_get_utc", |b| {
        b.iter(|| criterion::black_box(unsafe { xtime_get(&mut xt, TIME_UTC) }));
    });
}

criterion_group!(
    benches,
    bench_lock_unlock,
    bench_trylock,
    bench_timedlock,
    bench_tss,
    bench_call_once_done,
    bench_xtime_get
);
criterion_main!(benches);
