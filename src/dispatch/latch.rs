//! Single-settlement latch for one turn.

use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const RESOLVED: u8 = 1;
const REJECTED: u8 = 2;

/// Terminal state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Pending,
    Resolved,
    Rejected,
}

impl LatchState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            RESOLVED => LatchState::Resolved,
            REJECTED => LatchState::Rejected,
            _ => LatchState::Pending,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            LatchState::Pending => PENDING,
            LatchState::Resolved => RESOLVED,
            LatchState::Rejected => REJECTED,
        }
    }
}

/// PENDING moves to RESOLVED or REJECTED exactly once.
#[derive(Debug, Default)]
pub struct Latch {
    state: AtomicU8,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    pub fn state(&self) -> LatchState {
        LatchState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_settled(&self) -> bool {
        self.state() != LatchState::Pending
    }

    /// Attempt the terminal transition. Returns `true` only for the call
    /// that moved the latch out of PENDING.
    pub fn try_settle(&self, to: LatchState) -> bool {
        if to == LatchState::Pending {
            return false;
        }
        self.state
            .compare_exchange(PENDING, to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
