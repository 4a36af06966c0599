//! Cooperative cancellation for render tasks
//!
//! A render engine checks its token while it works and stops early once the
//! owner has lost interest in the result.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared abort flag for one render task
///
/// Clones observe the same state, so the tracker keeps one copy and the
/// engine (possibly on another thread) keeps the other.
///
/// # Example
///
/// ```
/// use pageflow_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let engine_side = token.clone();
///
/// token.cancel();
/// assert!(engine_side.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once any clone of this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancellation_is_visible_across_threads() {
        let token = CancellationToken::new();
        let worker = token.clone();

        token.cancel();
        let observed = thread::spawn(move || worker.is_cancelled()).join().unwrap();
        assert!(observed);
    }
}
