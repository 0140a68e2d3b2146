//! C11 mutex types.
//!
//! Validates the `type` argument of `mtx_init` and defines the observable
//! transition contract the ABI layer must honour. Actual locking happens in
//! the host library behind `c11threads-abi`; this module only holds the
//! safe-Rust decision logic.

use crate::status::{ThrdError, ThrdResult, ThrdStatus};

// ---------------------------------------------------------------------------
// Mutex type constants
// ---------------------------------------------------------------------------

/// Plain mutex: no timeout support, no recursion.
pub const MTX_PLAIN: i32 = 0;
/// Mutex intended for `mtx_trylock`.
pub const MTX_TRY: i32 = 1;
/// Mutex intended for `mtx_timedlock`.
pub const MTX_TIMED: i32 = 2;
/// Modifier: the owning thread may re-lock without deadlock.
pub const MTX_RECURSIVE: i32 = 4;

/// Base behaviour selected by `mtx_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MtxBase {
    Plain,
    Try,
    Timed,
}

/// A validated `mtx_init` type: exactly one base, optionally recursive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MtxKind {
    pub base: MtxBase,
    pub recursive: bool,
}

impl MtxKind {
    /// Every accepted combination, in raw-value order.
    pub const ALL: [Self; 6] = [
        Self::new(MtxBase::Plain, false),
        Self::new(MtxBase::Try, false),
        Self::new(MtxBase::Timed, false),
        Self::new(MtxBase::Plain, true),
        Self::new(MtxBase::Try, true),
        Self::new(MtxBase::Timed, true),
    ];

    #[must_use]
    pub const fn new(base: MtxBase, recursive: bool) -> Self {
        Self { base, recursive }
    }

    /// Decode a raw `mtx_init` type. Combined bases (`mtx_try | mtx_timed`)
    /// and unknown bits are rejected.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        let recursive = raw & MTX_RECURSIVE != 0;
        let base = match raw & !MTX_RECURSIVE {
            MTX_PLAIN => MtxBase::Plain,
            MTX_TRY => MtxBase::Try,
            MTX_TIMED => MtxBase::Timed,
            _ => return None,
        };
        Some(Self { base, recursive })
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        let base = match self.base {
            MtxBase::Plain => MTX_PLAIN,
            MtxBase::Try => MTX_TRY,
            MtxBase::Timed => MTX_TIMED,
        };
        if self.recursive {
            base | MTX_RECURSIVE
        } else {
            base
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match (self.base, self.recursive) {
            (MtxBase::Plain, false) => "plain",
            (MtxBase::Try, false) => "try",
            (MtxBase::Timed, false) => "timed",
            (MtxBase::Plain, true) => "plain|recursive",
            (MtxBase::Try, true) => "try|recursive",
            (MtxBase::Timed, true) => "timed|recursive",
        }
    }
}

/// Validate a raw type for `mtx_init`.
pub fn parse_mtx_type(raw: i32) -> ThrdResult<MtxKind> {
    MtxKind::from_raw(raw).ok_or(ThrdError::InvalidArgument("mutex type"))
}

// ---------------------------------------------------------------------------
// Transition contract
// ---------------------------------------------------------------------------

/// Abstract mutex state as seen by the calling thread. Recursion depth is
/// abstracted to one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexContractState {
    /// Storage has not been initialized as a mutex.
    Uninitialized,
    /// Initialized and free.
    Unlocked,
    /// Held by the calling thread.
    LockedBySelf,
    /// Held by a different thread.
    LockedByOther,
    /// Destroyed; must be re-initialized before reuse.
    Destroyed,
}

impl MutexContractState {
    pub const ALL: [Self; 5] = [
        Self::Uninitialized,
        Self::Unlocked,
        Self::LockedBySelf,
        Self::LockedByOther,
        Self::Destroyed,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Unlocked => "Unlocked",
            Self::LockedBySelf => "LockedBySelf",
            Self::LockedByOther => "LockedByOther",
            Self::Destroyed => "Destroyed",
        }
    }
}

/// Operations covered by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexContractOp {
    Init,
    Lock,
    TryLock,
    /// `mtx_timedlock` with a deadline already in the past.
    TimedLockExpired,
    Unlock,
    Destroy,
}

impl MutexContractOp {
    pub const ALL: [Self; 6] = [
        Self::Init,
        Self::Lock,
        Self::TryLock,
        Self::TimedLockExpired,
        Self::Unlock,
        Self::Destroy,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Lock => "Lock",
            Self::TryLock => "TryLock",
            Self::TimedLockExpired => "TimedLockExpired",
            Self::Unlock => "Unlock",
            Self::Destroy => "Destroy",
        }
    }
}

/// Deterministic outcome of one contract transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexContractOutcome {
    /// Abstract state after the operation.
    pub next: MutexContractState,
    /// Result code reported to the caller (once it stops blocking).
    pub status: ThrdStatus,
    /// Whether the operation waits for progress by another thread.
    pub blocks: bool,
    /// The host leaves this cell undefined; `status` is not a promise.
    pub undefined: bool,
}

const fn outcome(
    next: MutexContractState,
    status: ThrdStatus,
    blocks: bool,
) -> MutexContractOutcome {
    MutexContractOutcome {
        next,
        status,
        blocks,
        undefined: false,
    }
}

const fn undefined(state: MutexContractState, blocks: bool) -> MutexContractOutcome {
    MutexContractOutcome {
        next: state,
        status: ThrdStatus::Error,
        blocks,
        undefined: true,
    }
}

/// Contract transition for every `mtx_init` type.
///
/// Cells the host leaves undefined carry `undefined: true` and report
/// `Error` with no state change: any op on storage that is not an
/// initialized mutex, re-initializing a live mutex, destroying a held one,
/// unlocking a non-recursive mutex you do not own, and a non-recursive
/// self-relock (also modelled as blocking). Recursive mutexes reject a
/// non-owner unlock with a defined error.
#[must_use]
pub const fn mutex_contract_transition(
    raw_kind: i32,
    state: MutexContractState,
    op: MutexContractOp,
) -> MutexContractOutcome {
    use MutexContractOp as Op;
    use MutexContractState as St;

    let Some(kind) = MtxKind::from_raw(raw_kind) else {
        return outcome(state, ThrdStatus::Error, false);
    };

    match state {
        St::Uninitialized | St::Destroyed => match op {
            Op::Init => outcome(St::Unlocked, ThrdStatus::Success, false),
            _ => undefined(state, false),
        },
        St::Unlocked => match op {
            Op::Init => undefined(state, false),
            Op::Unlock => {
                if kind.recursive {
                    outcome(St::Unlocked, ThrdStatus::Error, false)
                } else {
                    undefined(state, false)
                }
            }
            Op::Lock | Op::TryLock | Op::TimedLockExpired => {
                outcome(St::LockedBySelf, ThrdStatus::Success, false)
            }
            Op::Destroy => outcome(St::Destroyed, ThrdStatus::Success, false),
        },
        St::LockedByOther => match op {
            Op::Lock => outcome(St::LockedByOther, ThrdStatus::Success, true),
            Op::TryLock | Op::TimedLockExpired => {
                outcome(St::LockedByOther, ThrdStatus::Busy, false)
            }
            Op::Unlock => {
                if kind.recursive {
                    outcome(St::LockedByOther, ThrdStatus::Error, false)
                } else {
                    undefined(state, false)
                }
            }
            Op::Init | Op::Destroy => undefined(state, false),
        },
        St::LockedBySelf => match op {
            Op::Init | Op::Destroy => undefined(state, false),
            Op::Unlock => outcome(St::Unlocked, ThrdStatus::Success, false),
            Op::Lock => {
                if kind.recursive {
                    outcome(St::LockedBySelf, ThrdStatus::Success, false)
                } else {
                    MutexContractOutcome {
                        next: St::LockedBySelf,
                        status: ThrdStatus::Success,
                        blocks: true,
                        undefined: true,
                    }
                }
            }
            Op::TryLock | Op::TimedLockExpired => {
                if kind.recursive {
                    outcome(St::LockedBySelf, ThrdStatus::Success, false)
                } else {
                    outcome(St::LockedBySelf, ThrdStatus::Busy, false)
                }
            }
        },
    }
}
