#![cfg(unix)]

use std::io::{self, Write};
use std::ptr;
use std::sync::{Arc, Barrier};

use c11threads_abi::{
    MTX_INITIALIZER_NP, call_once, mtx_destroy, mtx_init, mtx_lock, mtx_plain, mtx_t,
    mtx_trylock, mtx_unlock, thrd_busy, thrd_error, thrd_success,
};
use c11threads_core::trace;
use parking_lot::Mutex;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn records(&self) -> Vec<serde_json::Value> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[derive(Clone, Copy)]
struct SharedMutex(*mut mtx_t);

// SAFETY: the pointee is a host mutex, built to be shared between threads.
unsafe impl Send for SharedMutex {}

unsafe extern "C" fn never_runs() {}

/// Only failing calls reach the sink: errors at warn, contention at debug.
#[test]
fn failing_entry_points_write_one_line_each() {
    let buf = SharedBuf::default();
    trace::install_writer(Box::new(buf.clone()));

    // SAFETY: a null mutex is rejected before the host sees it.
    assert_eq!(unsafe { mtx_lock(ptr::null_mut()) }, thrd_error);

    let m = SharedMutex(Box::into_raw(Box::new(MTX_INITIALIZER_NP)));
    assert_eq!(unsafe { mtx_init(m.0, mtx_plain) }, thrd_success);
    let locked = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));
    let holder = {
        let (locked, done) = (Arc::clone(&locked), Arc::clone(&done));
        std::thread::spawn(move || {
            let m = m;
            assert_eq!(unsafe { mtx_lock(m.0) }, thrd_success);
            locked.wait();
            done.wait();
            assert_eq!(unsafe { mtx_unlock(m.0) }, thrd_success);
        })
    };
    locked.wait();
    assert_eq!(unsafe { mtx_trylock(m.0) }, thrd_busy);
    done.wait();
    holder.join().unwrap();

    assert_eq!(unsafe { mtx_lock(m.0) }, thrd_success);
    assert_eq!(unsafe { mtx_unlock(m.0) }, thrd_success);
    unsafe {
        mtx_destroy(m.0);
        drop(Box::from_raw(m.0));
    }

    // SAFETY: a null flag is rejected before `never_runs` could be called.
    unsafe { call_once(ptr::null_mut(), Some(never_runs)) };

    trace::disable();

    let records = buf.records();
    assert_eq!(records.len(), 3, "{records:?}");

    assert_eq!(records[0]["symbol"], "mtx_lock");
    assert_eq!(records[0]["api_family"], "mutex");
    assert_eq!(records[0]["status"], "error");
    assert_eq!(records[0]["level"], "warn");
    assert_eq!(records[0]["reason"], "mtx");

    assert_eq!(records[1]["symbol"], "mtx_trylock");
    assert_eq!(records[1]["status"], "busy");
    assert_eq!(records[1]["level"], "debug");
    assert!(records[1].get("reason").is_none());

    assert_eq!(records[2]["symbol"], "call_once");
    assert_eq!(records[2]["api_family"], "once");
    assert_eq!(records[2]["status"], "error");
    assert_eq!(records[2]["level"], "warn");
    assert_eq!(records[2]["reason"], "flag");
}
