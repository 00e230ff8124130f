//! Exactly-once completion signalling for one message cycle
//!
//! The primary attempt owns the completion step until the cycle falls back,
//! at which point ownership moves to the fallback attempt. Only the owner's
//! completion counts, and only once.

use std::sync::atomic::{AtomicU8, Ordering};

const OWNED_BY_PRIMARY: u8 = 0;
const OWNED_BY_FALLBACK: u8 = 1;
const DONE: u8 = 2;

/// Provider attempt within a message cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Primary,
    Fallback,
}

impl Attempt {
    fn owner_state(self) -> u8 {
        match self {
            Attempt::Primary => OWNED_BY_PRIMARY,
            Attempt::Fallback => OWNED_BY_FALLBACK,
        }
    }
}

/// Atomic owner token for the completion step
#[derive(Debug)]
pub struct CompletionGuard {
    state: AtomicU8,
}

impl Default for CompletionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(OWNED_BY_PRIMARY),
        }
    }

    /// Attempt that currently owns completion, `None` once completed
    pub fn owner(&self) -> Option<Attempt> {
        match self.state.load(Ordering::SeqCst) {
            OWNED_BY_PRIMARY => Some(Attempt::Primary),
            OWNED_BY_FALLBACK => Some(Attempt::Fallback),
            _ => None,
        }
    }

    /// Move ownership to the fallback attempt. Fails if the primary already
    /// completed.
    pub fn hand_off(&self) -> bool {
        self.state
            .compare_exchange(
                OWNED_BY_PRIMARY,
                OWNED_BY_FALLBACK,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Signal that `attempt` finished. Returns true only for the owner's
    /// first completion.
    pub fn complete(&self, attempt: Attempt) -> bool {
        self.state
            .compare_exchange(attempt.owner_state(), DONE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::SeqCst) == DONE
    }
}
