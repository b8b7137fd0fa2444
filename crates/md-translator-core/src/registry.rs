//! Single-flight job registry.
//!
//! At most one job may be outstanding per unit. The same entry point both
//! starts and stops work: toggling a unit with an active job cancels it,
//! toggling an idle unit registers a fresh cancellation token and runs the
//! supplied job to completion. The registry exclusively owns live tokens;
//! callers only ever see the clone handed to their job.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of a `toggle` call.
#[derive(Debug)]
pub enum ToggleOutcome<T> {
    /// A job was already active; it has been cancelled and no new job started.
    Cancelled,
    /// A new job ran to settlement with this result.
    Finished(Result<T>),
}

struct JobHandle {
    /// Monotonic id distinguishing this registration from any later one
    seq: u64,
    token: CancellationToken,
}

/// Removes the registration when the owning job settles or is dropped.
///
/// `toggle` holds this across the job future's await. If the future is
/// dropped instead of settling, `Drop` removes the entry (seq-checked), so
/// a dead registration can never wedge its unit.
struct RegistrationGuard<'a> {
    registry: &'a UnitJobRegistry,
    unit_id: usize,
    seq: u64,
    settled: bool,
}

impl RegistrationGuard<'_> {
    /// Checked removal on the normal settlement path.
    fn settle(mut self) -> Result<()> {
        self.settled = true;
        self.registry.deregister(self.unit_id, self.seq)
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.remove_dropped(self.unit_id, self.seq);
        }
    }
}

/// Registry enforcing at-most-one-active-job-per-unit.
#[derive(Default)]
pub struct UnitJobRegistry {
    jobs: Mutex<HashMap<usize, JobHandle>>,
    next_seq: AtomicU64,
}

impl UnitJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel-or-start toggle for one unit.
    ///
    /// The check-then-set runs under a single synchronous lock with no await
    /// point in between, so two interleaved toggles can never both observe a
    /// free slot. The entry is removed when the job settles, whatever the
    /// outcome, and also when the job's future is dropped mid-flight (a
    /// disconnected HTTP handler, an aborted task): the registration guard
    /// cleans up on drop, so the unit never stays busy forever.
    pub async fn toggle<F, Fut, T>(&self, unit_id: usize, start_fn: F) -> ToggleOutcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (guard, token) = {
            #[allow(clippy::expect_used)] // lock poisoning means a prior panic; propagate it
            let mut jobs = self.jobs.lock().expect("registry lock poisoned");
            if let Some(handle) = jobs.get(&unit_id) {
                debug!("Cancelling active job for unit {unit_id}");
                handle.token.cancel();
                return ToggleOutcome::Cancelled;
            }

            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            jobs.insert(
                unit_id,
                JobHandle {
                    seq,
                    token: token.clone(),
                },
            );
            (
                RegistrationGuard {
                    registry: self,
                    unit_id,
                    seq,
                    settled: false,
                },
                token,
            )
        };

        let result = start_fn(token).await;

        if let Err(e) = guard.settle() {
            return ToggleOutcome::Finished(Err(e));
        }

        ToggleOutcome::Finished(result)
    }

    /// Remove a settled job's entry, verifying it is still ours.
    fn deregister(&self, unit_id: usize, seq: u64) -> Result<()> {
        #[allow(clippy::expect_used)]
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        match jobs.get(&unit_id) {
            Some(handle) if handle.seq == seq => {
                jobs.remove(&unit_id);
                Ok(())
            }
            // Another registration in our slot (or none at all) means the
            // single-flight bookkeeping was violated. A bug, fail loudly.
            Some(_) => Err(Error::Invariant(format!(
                "unit {unit_id} entry replaced while its job was running"
            ))),
            None => Err(Error::Invariant(format!(
                "unit {unit_id} entry vanished while its job was running"
            ))),
        }
    }

    /// Pure query: is a job currently registered for this unit?
    pub fn is_active(&self, unit_id: usize) -> bool {
        #[allow(clippy::expect_used)]
        let jobs = self.jobs.lock().expect("registry lock poisoned");
        jobs.contains_key(&unit_id)
    }

    /// Number of currently registered jobs.
    pub fn active_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        let jobs = self.jobs.lock().expect("registry lock poisoned");
        jobs.len()
    }

    /// Best-effort removal of an entry that never settled.
    fn remove_dropped(&self, unit_id: usize, seq: u64) {
        // Never panic here: this runs from Drop, possibly while unwinding.
        if let Ok(mut jobs) = self.jobs.lock()
            && jobs.get(&unit_id).is_some_and(|handle| handle.seq == seq)
        {
            debug!("Removing entry for unit {unit_id} whose job future was dropped");
            jobs.remove(&unit_id);
        }
    }

    /// Cancel every registered job.
    ///
    /// Used before a reparse/reload so stale jobs cannot write into a unit
    /// index that now refers to different content. Entries are removed by
    /// their owning jobs as they wind down.
    pub fn cancel_all(&self) {
        #[allow(clippy::expect_used)]
        let jobs = self.jobs.lock().expect("registry lock poisoned");
        for (unit_id, handle) in jobs.iter() {
            debug!("Cancelling job for unit {unit_id}");
            handle.token.cancel();
        }
    }
}
