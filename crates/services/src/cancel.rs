use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EstimatorError;

/// Cooperative cancellation signal shared between a running task and whoever
/// may interrupt it. Estimators poll it between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag has been raised.
    pub fn check(&self) -> Result<(), EstimatorError> {
        if self.is_cancelled() {
            Err(EstimatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(flag.check().is_ok());
        handle.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(EstimatorError::Cancelled)));
    }
}
