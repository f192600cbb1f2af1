//! Cooperative cancellation.
//!
//! A token is shared between the owner of a computation and the thread
//! running it. The runner polls it at node boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const INTERRUPTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observed state of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Running,
    /// Stop and hand back resumable work.
    Interrupted,
    /// Stop and discard everything.
    Cancelled,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicU8>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the runner to pause at the next boundary.
    ///
    /// Has no effect on a cancelled token.
    pub fn interrupt(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, INTERRUPTED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Ask the runner to stop and discard its work.
    pub fn cancel(&self) {
        self.0.store(CANCELLED, Ordering::Release);
    }

    pub fn state(&self) -> TokenState {
        match self.0.load(Ordering::Acquire) {
            RUNNING => TokenState::Running,
            INTERRUPTED => TokenState::Interrupted,
            _ => TokenState::Cancelled,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TokenState::Cancelled
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.state() == TokenState::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_transitions() {
        let token = CancellationToken::new();
        assert_eq!(token.state(), TokenState::Running);

        let shared = token.clone();
        shared.interrupt();
        assert!(token.is_interrupted());

        token.cancel();
        assert!(shared.is_cancelled());

        // Cancellation is final.
        shared.interrupt();
        assert!(token.is_cancelled());
    }
}
