use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use phai_core::{Error, Result};

/// Cooperative cancellation flag shared between a job and its controller.
///
/// Setting the flag never interrupts work in flight; long-running loops poll
/// it at their checkpoints.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    /// Create a flag in the not-requested state
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the owning job to stop at its next checkpoint
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: `Err(Cancelled)` once a stop has been requested
    ///
    /// # Errors
    /// Returns `Error::Cancelled` if the flag is set
    pub fn check(&self) -> Result<()> {
        if self.is_requested() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        observer.check().unwrap();

        flag.request();
        assert!(observer.is_requested());
        assert!(matches!(observer.check(), Err(Error::Cancelled)));
    }
}
