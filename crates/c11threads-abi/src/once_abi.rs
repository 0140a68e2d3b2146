//! ABI layer for `call_once`.
//!
//! `once_flag` wraps a `parking_lot::Once`, whose const constructor gives
//! `ONCE_FLAG_INIT` an explicit not-yet-run state. Late callers park until the
//! first caller's initializer returns.

use c11threads_core::{ApiFamily, ThrdError, ThrdResult};
use parking_lot::Once;

use crate::host::non_null;
use crate::observe;

/// One-time initialization gate.
///
/// The layout is whatever `parking_lot::Once` has, which that crate does not
/// promise to keep stable. C code must size the flag from the Rust build (a
/// single byte today) and never declare its own struct.
#[repr(C)]
pub struct once_flag {
    state: Once,
}

impl once_flag {
    /// True once an initializer has completed through this flag.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.state().done()
    }
}

/// Not-yet-run state for a `once_flag`.
pub const ONCE_FLAG_INIT: once_flag = once_flag { state: Once::new() };

/// `void (*)(void)` initializer.
pub type once_func_t = Option<unsafe extern "C" fn()>;

unsafe fn call_once_impl(flag: *mut once_flag, func: once_func_t) -> ThrdResult<()> {
    non_null(flag, "flag")?;
    let func = func.ok_or(ThrdError::InvalidArgument("func"))?;
    // SAFETY: non-null checked; concurrent callers only take shared references.
    let flag = unsafe { &*flag };
    // SAFETY: initializer contract is the caller's.
    flag.state.call_once(|| unsafe { func() });
    Ok(())
}

/// `call_once`: run `func` exactly once per `flag`. Null arguments are a no-op.
#[unsafe(no_mangle)]
#[allow(improper_ctypes_definitions)]
pub unsafe extern "C" fn call_once(flag: *mut once_flag, func: once_func_t) {
    let _ = observe::finish(ApiFamily::Once, "call_once", unsafe {
        call_once_impl(flag, func)
    });
}
