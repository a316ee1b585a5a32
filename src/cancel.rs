use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::CompositeError;

/// Issues generation-stamped tokens. Issuing a new token or calling
/// [`cancel_all`](Self::cancel_all) invalidates every token issued before.
#[derive(Debug, Clone, Default)]
pub struct CancelSource {
    latest: Arc<AtomicU64>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> CancelToken {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        CancelToken {
            latest: Arc::clone(&self.latest),
            generation,
        }
    }

    pub fn cancel_all(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    latest: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    /// A token nothing can cancel.
    pub fn never() -> Self {
        Self {
            latest: Arc::new(AtomicU64::new(0)),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.generation
    }

    pub fn check(&self) -> Result<(), CompositeError> {
        if self.is_cancelled() {
            Err(CompositeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
