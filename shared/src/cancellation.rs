//! Cooperative cancellation for capture runs.
//!
//! The orchestrator keeps the [`CancelSource`] of the active run and hands a
//! [`CancelToken`] to the run thread. The sequencer polls the token at grid
//! boundaries only, so an in-flight move or trigger always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Control side of a cancellation signal.
///
/// Dropping the source does not cancel its tokens.
#[derive(Debug, Clone, Default)]
pub struct CancelSource {
    cancelled: Arc<AtomicBool>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Token that is never cancelled.
    pub fn never() -> Self {
        CancelSource::new().token()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
