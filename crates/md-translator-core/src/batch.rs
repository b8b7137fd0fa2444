//! Batch-run bookkeeping.
//!
//! A batch run sweeps every unit still needing work, in ascending id order,
//! with an inter-unit delay and a cooperative stop flag. The flag is checked
//! between units only: the unit in flight is allowed to drain (graceful
//! drain policy). Exactly one batch run may be active at a time; starting a
//! second is rejected.

use std::sync::atomic::{AtomicBool, Ordering};

/// Control flags for the active batch run.
#[derive(Default)]
pub struct BatchControl {
    active: AtomicBool,
    stop_requested: AtomicBool,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single batch slot. Returns false if a run is already active.
    pub fn try_begin(&self) -> bool {
        let claimed = self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.stop_requested.store(false, Ordering::SeqCst);
        }
        claimed
    }

    /// Release the slot and clear the stop flag.
    pub fn finish(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Request cooperative termination; honored between units.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Per-unit progress notification emitted during a batch run.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Unit currently being processed
    pub unit_id: usize,
    /// Units completed so far in this run
    pub completed: usize,
    /// Units this run set out to process
    pub planned: usize,
}

/// Summary of a finished batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Units for which a job was started
    pub attempted: usize,
    /// Units that completed with text
    pub completed: usize,
    /// Per-unit failures; a failure never aborts the sweep
    pub failed: Vec<(usize, String)>,
    /// True if the run ended early because stop was requested
    pub stopped: bool,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_run_claims_the_slot() {
        let control = BatchControl::new();
        assert!(control.try_begin());
        assert!(!control.try_begin());

        control.finish();
        assert!(control.try_begin());
    }

    #[test]
    fn test_begin_clears_stale_stop_flag() {
        let control = BatchControl::new();
        control.request_stop();

        assert!(control.try_begin());
        assert!(!control.stop_requested());
    }

    #[test]
    fn test_finish_resets_flags() {
        let control = BatchControl::new();
        assert!(control.try_begin());
        control.request_stop();

        control.finish();
        assert!(!control.is_active());
        assert!(!control.stop_requested());
    }
}
