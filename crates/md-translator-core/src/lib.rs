//! Markdown Translator Core Library
//!
//! This library provides the core functionality for the Markdown translation
//! workbench:
//! - Paragraph splitting into translatable units
//! - Translation/proofreading via LLM HTTP APIs (OpenAI, Anthropic, Ollama,
//!   and OpenAI-compatible servers), streaming or not
//! - Single-flight per-unit job registry with cancel-or-start toggling
//! - Batch driver with inter-unit pacing and cooperative stop
//! - Progress save/load and plain-text export

pub mod batch;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod prompt;
pub mod registry;
pub mod stream;
pub mod util;

pub use batch::{BatchControl, BatchProgress, BatchReport};
pub use client::{ClientInfo, HttpJobClient, JobClient, JobKind, JobRequest, create_client};
pub use config::{ClientConfig, Provider, WorkbenchConfig};
pub use document::{Document, ProgressRecord, Unit};
pub use error::{Error, Result};
pub use registry::{ToggleOutcome, UnitJobRegistry};
pub use stream::{Framing, StreamAccumulator};

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Callback receiving `(unit_id, accumulated_snapshot)` whenever a unit's
/// result changes. The workbench never touches a rendering surface itself;
/// presentation layers subscribe through this.
pub type UnitUpdateFn<'a> = &'a (dyn Fn(usize, &str) + Send + Sync);

/// Callback receiving progress notifications during a batch run.
pub type BatchProgressFn<'a> = &'a (dyn Fn(BatchProgress) + Send + Sync);

/// Outcome of toggling a single unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Job ran to completion with this final text
    Completed(String),
    /// A running job was cancelled (or this job was cancelled mid-flight);
    /// never surfaced as an error
    Cancelled,
}

/// High-level workbench that owns the document, the job registry, and the
/// batch control state.
///
/// One instance per open document. All mutable state lives here explicitly;
/// there are no module-level singletons. UI layers hold one instance and
/// drive it via these calls.
pub struct Workbench {
    document: Mutex<Document>,
    registry: UnitJobRegistry,
    batch: BatchControl,
    client: Arc<dyn JobClient>,
    config: RwLock<WorkbenchConfig>,
}

impl Workbench {
    /// Create a workbench with the given configuration.
    pub fn new(config: WorkbenchConfig) -> Self {
        let client = create_client(&config.client);
        Self::with_client(client, config)
    }

    /// Create with a custom job client (mocks in tests, alternate backends).
    pub fn with_client(client: Arc<dyn JobClient>, config: WorkbenchConfig) -> Self {
        Self {
            document: Mutex::new(Document::default()),
            registry: UnitJobRegistry::new(),
            batch: BatchControl::new(),
            client,
            config: RwLock::new(config),
        }
    }

    // =========================================================================
    // Document lifecycle
    // =========================================================================

    /// Replace the unit sequence by parsing new Markdown content.
    ///
    /// All in-flight jobs are cancelled first so stale jobs cannot write into
    /// unit indices that now refer to different content.
    pub fn load_document(&self, content: &str) -> usize {
        self.registry.cancel_all();
        let document = Document::parse(content);
        let count = document.len();
        info!("Loaded document with {} units", count);
        *self.lock_document() = document;
        count
    }

    /// Replace the unit sequence from a saved progress document.
    pub fn load_progress(&self, records: &[ProgressRecord]) -> usize {
        self.registry.cancel_all();
        let document = Document::from_progress(records);
        let count = document.len();
        info!("Loaded progress with {} units", count);
        *self.lock_document() = document;
        count
    }

    /// Snapshot the current state as progress records.
    pub fn progress(&self) -> Vec<ProgressRecord> {
        self.lock_document().to_progress()
    }

    /// Export the translated document as plain text.
    pub fn export_text(&self) -> String {
        self.lock_document().export_text()
    }

    pub fn unit_count(&self) -> usize {
        self.lock_document().len()
    }

    pub fn unit(&self, unit_id: usize) -> Option<Unit> {
        self.lock_document().unit(unit_id).cloned()
    }

    pub fn units(&self) -> Vec<Unit> {
        self.lock_document().units().to_vec()
    }

    /// Direct user edit of a unit's result.
    ///
    /// Rejected while a job owns the unit: only the owning job may write a
    /// unit's result while it is active.
    pub fn set_result(&self, unit_id: usize, text: impl Into<String>) -> Result<()> {
        if self.registry.is_active(unit_id) {
            return Err(Error::UnitBusy(unit_id));
        }
        if self.lock_document().set_result(unit_id, text) {
            Ok(())
        } else {
            Err(Error::UnknownUnit(unit_id))
        }
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Cancel-or-start toggle for a single unit.
    ///
    /// If a job is active for the unit it is cancelled and `Cancelled` is
    /// returned; otherwise a new job runs to settlement. Streamed snapshots
    /// are applied to the unit's result in arrival order and forwarded to
    /// `on_update`. Partial text written before a cancellation stays in
    /// place; nothing is rolled back.
    pub async fn toggle_unit(
        &self,
        unit_id: usize,
        kind: JobKind,
        on_update: Option<UnitUpdateFn<'_>>,
    ) -> Result<UnitOutcome> {
        let request = self.build_request(unit_id, kind)?;
        let client = Arc::clone(&self.client);

        let outcome = self
            .registry
            .toggle(unit_id, |token| async move {
                let sink_token = token.clone();
                let sink = move |snapshot: &str| {
                    // No delta mutates unit state once cancellation is requested
                    if sink_token.is_cancelled() {
                        return;
                    }
                    self.apply_result(unit_id, snapshot);
                    if let Some(callback) = on_update {
                        callback(unit_id, snapshot);
                    }
                };

                let text = client.run(&request, &token, &sink).await?;
                self.apply_result(unit_id, &text);
                if let Some(callback) = on_update {
                    callback(unit_id, &text);
                }
                Ok(text)
            })
            .await;

        match outcome {
            ToggleOutcome::Cancelled => Ok(UnitOutcome::Cancelled),
            ToggleOutcome::Finished(Ok(text)) => Ok(UnitOutcome::Completed(text)),
            ToggleOutcome::Finished(Err(e)) if e.is_cancelled() => Ok(UnitOutcome::Cancelled),
            ToggleOutcome::Finished(Err(e)) => Err(e),
        }
    }

    /// Run `kind` over every unit still needing work, in ascending id order.
    ///
    /// Per-unit failures are recorded and the sweep continues; the stop flag
    /// is honored between units (the in-flight unit drains). A second call
    /// while a run is active is rejected.
    pub async fn run_batch(
        &self,
        kind: JobKind,
        on_update: Option<UnitUpdateFn<'_>>,
        on_progress: Option<BatchProgressFn<'_>>,
    ) -> Result<BatchReport> {
        self.claim_batch()?;
        Ok(self.run_claimed_batch(kind, on_update, on_progress).await)
    }

    /// Claim the batch slot without starting the sweep yet.
    ///
    /// Callers that publish tracking state before the run starts claim
    /// first, so a concurrent start cannot slip in between their check and
    /// their publish. A claim must be consumed by `run_claimed_batch` or
    /// given back with `release_batch`.
    pub fn claim_batch(&self) -> Result<()> {
        if self.batch.try_begin() {
            Ok(())
        } else {
            Err(Error::BatchAlreadyRunning)
        }
    }

    /// Give back a claim from `claim_batch` without running.
    pub fn release_batch(&self) {
        self.batch.finish();
    }

    /// Run the sweep on a slot already claimed via `claim_batch`.
    /// The slot is released when the run settles.
    pub async fn run_claimed_batch(
        &self,
        kind: JobKind,
        on_update: Option<UnitUpdateFn<'_>>,
        on_progress: Option<BatchProgressFn<'_>>,
    ) -> BatchReport {
        let report = self.run_batch_inner(kind, on_update, on_progress).await;
        self.batch.finish();

        if report.has_failures() {
            warn!(
                "Batch run finished with {} failed of {} attempted units",
                report.failed.len(),
                report.attempted
            );
        } else {
            info!("Batch run completed {} units", report.completed);
        }

        report
    }

    async fn run_batch_inner(
        &self,
        kind: JobKind,
        on_update: Option<UnitUpdateFn<'_>>,
        on_progress: Option<BatchProgressFn<'_>>,
    ) -> BatchReport {
        let total = self.unit_count();
        let planned = {
            let document = self.lock_document();
            document.units().iter().filter(|u| u.needs_work()).count()
        };
        let delay_ms = self.read_config().batch_delay_ms;

        let mut report = BatchReport::default();

        for unit_id in 0..total {
            if self.batch.stop_requested() {
                report.stopped = true;
                break;
            }

            // Re-check right before starting: a manual edit or direct job may
            // have filled this unit in since the sweep began
            let needs_work = self
                .lock_document()
                .unit(unit_id)
                .is_some_and(Unit::needs_work);
            if !needs_work {
                continue;
            }

            if let Some(callback) = on_progress {
                callback(BatchProgress {
                    unit_id,
                    completed: report.completed,
                    planned,
                });
            }

            report.attempted += 1;
            match self.toggle_unit(unit_id, kind, on_update).await {
                Ok(UnitOutcome::Completed(_)) => {
                    report.completed += 1;
                    // Pace requests; skip the wait once a stop came in
                    if !self.batch.stop_requested() && delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Ok(UnitOutcome::Cancelled) => {
                    // User toggled this unit off mid-batch; move on without delay
                }
                Err(e) => {
                    warn!("Unit {} failed: {}", unit_id, e);
                    report.failed.push((unit_id, e.to_string()));
                }
            }
        }

        report
    }

    /// Request cooperative termination of the active batch run.
    pub fn request_stop(&self) {
        self.batch.request_stop();
    }

    pub fn batch_active(&self) -> bool {
        self.batch.is_active()
    }

    /// Cancel every in-flight job.
    pub fn cancel_all(&self) {
        self.registry.cancel_all();
    }

    pub fn is_unit_active(&self, unit_id: usize) -> bool {
        self.registry.is_active(unit_id)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn config(&self) -> WorkbenchConfig {
        self.read_config().clone()
    }

    pub fn set_prompts(&self, translate_prompt: String, proofread_prompt: String) {
        let mut config = self.write_config();
        config.translate_prompt = translate_prompt;
        config.proofread_prompt = proofread_prompt;
    }

    pub fn set_batch_delay(&self, delay_ms: u64) {
        self.write_config().batch_delay_ms = delay_ms;
    }

    pub fn client_info(&self) -> ClientInfo {
        self.client.info()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn build_request(&self, unit_id: usize, kind: JobKind) -> Result<JobRequest> {
        let config = self.read_config().clone();
        let document = self.lock_document();
        let unit = document
            .unit(unit_id)
            .ok_or(Error::UnknownUnit(unit_id))?;
        let (context_before, context_after) = document.context(unit_id, config.context_window);

        let prompt_template = match kind {
            JobKind::Translate => config.translate_prompt,
            JobKind::Proofread => config.proofread_prompt,
        };
        let current_result =
            (kind == JobKind::Proofread).then(|| unit.result_text.clone());

        Ok(JobRequest {
            kind,
            unit_text: unit.source_text.clone(),
            context_before,
            context_after,
            prompt_template,
            current_result,
        })
    }

    /// Write a snapshot into the unit (job-owned write path).
    fn apply_result(&self, unit_id: usize, text: &str) {
        self.lock_document().set_result(unit_id, text);
    }

    #[allow(clippy::expect_used)] // lock poisoning means a prior panic; propagate it
    fn lock_document(&self) -> std::sync::MutexGuard<'_, Document> {
        self.document.lock().expect("document lock poisoned")
    }

    #[allow(clippy::expect_used)]
    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, WorkbenchConfig> {
        self.config.read().expect("config lock poisoned")
    }

    #[allow(clippy::expect_used)]
    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, WorkbenchConfig> {
        self.config.write().expect("config lock poisoned")
    }
}
