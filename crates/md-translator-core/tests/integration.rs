//! Integration tests for md-translator-core
//!
//! These tests verify the end-to-end workflow:
//! - Single-flight toggling and cancellation
//! - Batch runs with skip/stop/failure semantics
//! - Streamed delta accumulation through the workbench
//! - Prompt validation happening before any network traffic

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use md_translator_core::client::{ClientInfo, DeltaSink, JobClient, JobKind, JobRequest};
use md_translator_core::{
    ClientConfig, Error, HttpJobClient, Provider, Result, UnitOutcome, Workbench, WorkbenchConfig,
};

// =============================================================================
// Mock Job Clients
// =============================================================================

/// Returns canned replies keyed by unit text, without network calls.
struct MockClient {
    replies: HashMap<String, String>,
    /// Unit texts for which the job fails with an upstream error
    fail_on: Vec<String>,
    calls: AtomicUsize,
}

impl MockClient {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobClient for MockClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: "mock",
            requires_api_key: false,
            supports_streaming: false,
        }
    }

    async fn run(
        &self,
        request: &JobRequest,
        _token: &CancellationToken,
        _on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_on.contains(&request.unit_text) {
            return Err(Error::Upstream {
                status: 500,
                body: "mock upstream failure".to_string(),
            });
        }

        Ok(self
            .replies
            .get(&request.unit_text)
            .cloned()
            .unwrap_or_else(|| format!("[TRANSLATED] {}", request.unit_text)))
    }
}

/// Blocks until cancelled; models a long-running upstream request.
struct BlockingClient {
    calls: AtomicUsize,
}

impl BlockingClient {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobClient for BlockingClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: "blocking-mock",
            requires_api_key: false,
            supports_streaming: false,
        }
    }

    async fn run(
        &self,
        _request: &JobRequest,
        token: &CancellationToken,
        _on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        token.cancelled().await;
        Err(Error::Cancelled)
    }
}

/// Emits scripted snapshots, then parks until cancelled and tries to emit one
/// more snapshot after the fact (which must never land).
struct StreamingCancelClient {
    first_delta_sent: tokio::sync::Notify,
}

impl StreamingCancelClient {
    fn new() -> Self {
        Self {
            first_delta_sent: tokio::sync::Notify::new(),
        }
    }
}

#[async_trait]
impl JobClient for StreamingCancelClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: "streaming-cancel-mock",
            requires_api_key: false,
            supports_streaming: true,
        }
    }

    async fn run(
        &self,
        _request: &JobRequest,
        token: &CancellationToken,
        on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        on_delta("Hello");
        self.first_delta_sent.notify_one();

        token.cancelled().await;

        // A straggler delta arriving after the abort request
        on_delta("Hello world");
        Err(Error::Cancelled)
    }
}

/// Streams two snapshots and completes.
struct StreamingClient;

#[async_trait]
impl JobClient for StreamingClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: "streaming-mock",
            requires_api_key: false,
            supports_streaming: true,
        }
    }

    async fn run(
        &self,
        _request: &JobRequest,
        _token: &CancellationToken,
        on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        on_delta("Hello");
        tokio::task::yield_now().await;
        on_delta("Hello world");
        Ok("Hello world".to_string())
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn test_config() -> WorkbenchConfig {
    WorkbenchConfig {
        batch_delay_ms: 0,
        context_window: 0,
        ..Default::default()
    }
}

fn workbench_with(client: Arc<dyn JobClient>, content: &str) -> Workbench {
    let workbench = Workbench::with_client(client, test_config());
    workbench.load_document(content);
    workbench
}

async fn wait_until_active(workbench: &Workbench, unit_id: usize) {
    while !workbench.is_unit_active(unit_id) {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// End-to-End Batch Tests
// =============================================================================

#[tokio::test]
async fn test_batch_translates_all_units_in_order() {
    let client = Arc::new(MockClient::new(&[
        ("Bonjour", "Hello"),
        ("Au revoir", "Goodbye"),
    ]));
    let workbench = workbench_with(client.clone(), "Bonjour\n\nAu revoir");

    let report = workbench
        .run_batch(JobKind::Translate, None, None)
        .await
        .expect("batch should start");

    assert_eq!(report.attempted, 2);
    assert_eq!(report.completed, 2);
    assert!(!report.stopped);
    assert!(!report.has_failures());
    assert_eq!(client.call_count(), 2);

    let results: Vec<_> = workbench
        .units()
        .into_iter()
        .map(|u| u.result_text)
        .collect();
    assert_eq!(results, vec!["Hello".to_string(), "Goodbye".to_string()]);
    assert_eq!(workbench.export_text(), "Hello\n\nGoodbye");
}

#[tokio::test]
async fn test_batch_skips_units_with_results() {
    let client = Arc::new(MockClient::new(&[]));
    let workbench = workbench_with(
        client.clone(),
        "first paragraph\n\nsecond paragraph\n\nthird paragraph",
    );
    workbench
        .set_result(1, "already done")
        .expect("unit exists");

    let report = workbench
        .run_batch(JobKind::Translate, None, None)
        .await
        .expect("batch should start");

    // Exactly two jobs, skipping index 1
    assert_eq!(report.attempted, 2);
    assert_eq!(client.call_count(), 2);
    assert_eq!(
        workbench.unit(1).map(|u| u.result_text),
        Some("already done".to_string())
    );
}

#[tokio::test]
async fn test_batch_continues_past_unit_failure() {
    let client = Arc::new(
        MockClient::new(&[("good paragraph", "ok")]).failing_on("bad paragraph"),
    );
    let workbench = workbench_with(client.clone(), "bad paragraph\n\ngood paragraph");

    let report = workbench
        .run_batch(JobKind::Translate, None, None)
        .await
        .expect("batch should start");

    assert_eq!(report.attempted, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 0);
    assert_eq!(workbench.unit(1).map(|u| u.result_text), Some("ok".to_string()));
}

#[tokio::test]
async fn test_cooperative_stop_skips_remaining_units() {
    let client = Arc::new(MockClient::new(&[]));
    let workbench = workbench_with(client.clone(), "first paragraph\n\nsecond paragraph");

    // Request stop while unit 0's job is finishing; unit 0 drains, unit 1
    // never starts
    let on_update = |_unit_id: usize, _snapshot: &str| {
        workbench.request_stop();
    };
    let report = workbench
        .run_batch(JobKind::Translate, Some(&on_update), None)
        .await
        .expect("batch should start");

    assert_eq!(report.completed, 1);
    assert!(report.stopped);
    assert_eq!(client.call_count(), 1);
    assert!(workbench.unit(1).is_some_and(|u| u.result_text.is_empty()));
    assert!(!workbench.batch_active());
}

#[tokio::test]
async fn test_second_batch_is_rejected_while_active() {
    let client = Arc::new(BlockingClient::new());
    let workbench = Arc::new(workbench_with(client, "only paragraph"));

    let runner = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.run_batch(JobKind::Translate, None, None).await })
    };

    wait_until_active(&workbench, 0).await;

    let second = workbench.run_batch(JobKind::Translate, None, None).await;
    assert!(matches!(second, Err(Error::BatchAlreadyRunning)));

    workbench.cancel_all();
    let report = runner
        .await
        .expect("task panicked")
        .expect("batch should settle");
    assert_eq!(report.completed, 0);
    assert!(!workbench.batch_active());
}

// =============================================================================
// Single-Flight / Cancellation Tests
// =============================================================================

#[tokio::test]
async fn test_toggle_cancels_active_job_instead_of_starting() {
    let client = Arc::new(BlockingClient::new());
    let workbench = Arc::new(workbench_with(client.clone(), "slow paragraph"));

    let first = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.toggle_unit(0, JobKind::Translate, None).await })
    };

    wait_until_active(&workbench, 0).await;

    let second = workbench
        .toggle_unit(0, JobKind::Translate, None)
        .await
        .expect("toggle should not error");
    assert_eq!(second, UnitOutcome::Cancelled);

    let first = first
        .await
        .expect("task panicked")
        .expect("cancellation is not an error");
    assert_eq!(first, UnitOutcome::Cancelled);

    // Exactly one job ever reached the client
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(!workbench.is_unit_active(0));
}

#[tokio::test]
async fn test_dropped_handler_task_releases_the_unit() {
    let client = Arc::new(BlockingClient::new());
    let workbench = Arc::new(workbench_with(client.clone(), "slow paragraph"));

    let job = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.toggle_unit(0, JobKind::Translate, None).await })
    };
    wait_until_active(&workbench, 0).await;

    // A disconnected caller drops the toggle future without settling it;
    // awaiting the aborted handle guarantees the drop has run
    job.abort();
    assert!(job.await.is_err());
    assert!(!workbench.is_unit_active(0));

    // The unit accepts a fresh job instead of treating the dead
    // registration as active
    let second = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.toggle_unit(0, JobKind::Translate, None).await })
    };
    wait_until_active(&workbench, 0).await;
    while client.calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    let third = workbench
        .toggle_unit(0, JobKind::Translate, None)
        .await
        .expect("toggle should not error");
    assert_eq!(third, UnitOutcome::Cancelled);
    let second = second
        .await
        .expect("task panicked")
        .expect("cancellation is not an error");
    assert_eq!(second, UnitOutcome::Cancelled);
}

#[tokio::test]
async fn test_cancellation_keeps_partial_text_and_blocks_stragglers() {
    let client = Arc::new(StreamingCancelClient::new());
    let workbench = Arc::new(workbench_with(client.clone(), "slow paragraph"));

    let job = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.toggle_unit(0, JobKind::Translate, None).await })
    };

    client.first_delta_sent.notified().await;
    assert_eq!(workbench.unit(0).map(|u| u.result_text), Some("Hello".to_string()));

    // Second toggle aborts the job; the straggler delta must not land
    let outcome = workbench
        .toggle_unit(0, JobKind::Translate, None)
        .await
        .expect("toggle should not error");
    assert_eq!(outcome, UnitOutcome::Cancelled);

    let job_outcome = job
        .await
        .expect("task panicked")
        .expect("cancellation is not an error");
    assert_eq!(job_outcome, UnitOutcome::Cancelled);

    // Partial text stays exactly as it was at the moment of cancellation
    assert_eq!(workbench.unit(0).map(|u| u.result_text), Some("Hello".to_string()));
}

#[tokio::test]
async fn test_streamed_snapshots_arrive_in_order() {
    let client = Arc::new(StreamingClient);
    let workbench = workbench_with(client, "streamed paragraph");

    let snapshots = Mutex::new(Vec::new());
    let on_update = |_unit_id: usize, snapshot: &str| {
        snapshots
            .lock()
            .expect("snapshot lock poisoned")
            .push(snapshot.to_string());
    };

    let outcome = workbench
        .toggle_unit(0, JobKind::Translate, Some(&on_update))
        .await
        .expect("job should succeed");
    assert_eq!(outcome, UnitOutcome::Completed("Hello world".to_string()));

    let seen = snapshots.into_inner().expect("snapshot lock poisoned");
    assert_eq!(
        seen,
        vec![
            "Hello".to_string(),
            "Hello world".to_string(),
            // Final settlement re-emits the last accumulated snapshot
            "Hello world".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_reload_cancels_in_flight_jobs() {
    let client = Arc::new(BlockingClient::new());
    let workbench = Arc::new(workbench_with(client, "original paragraph"));

    let job = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move { workbench.toggle_unit(0, JobKind::Translate, None).await })
    };

    wait_until_active(&workbench, 0).await;

    workbench.load_document("replacement paragraph");

    let outcome = job
        .await
        .expect("task panicked")
        .expect("cancellation is not an error");
    assert_eq!(outcome, UnitOutcome::Cancelled);

    // The replaced unit is untouched by the stale job
    assert!(workbench.unit(0).is_some_and(|u| u.result_text.is_empty()));
}

// =============================================================================
// Prompt Validation Tests
// =============================================================================

#[tokio::test]
async fn test_bad_template_fails_before_any_network_call() {
    // Unroutable endpoint: if a request were attempted it would fail with a
    // transport error, not a template error
    let mut config = ClientConfig::new(Provider::Custom, None, "test-model");
    config.api_base = Some("http://127.0.0.1:1".to_string());
    let client = HttpJobClient::new(config);

    let request = JobRequest {
        kind: JobKind::Translate,
        unit_text: "Bonjour".to_string(),
        context_before: Vec::new(),
        context_after: Vec::new(),
        prompt_template: "no placeholder here".to_string(),
        current_result: None,
    };

    let token = CancellationToken::new();
    let sink = |_: &str| {};
    let err = client
        .run(&request, &token, &sink)
        .await
        .expect_err("template must be rejected");
    assert!(matches!(err, Error::PromptTemplate(_)));

    // Two placeholders are just as invalid as zero
    let request = JobRequest {
        prompt_template: "{{text}} and {{text}}".to_string(),
        ..request
    };
    let err = client
        .run(&request, &token, &sink)
        .await
        .expect_err("template must be rejected");
    assert!(matches!(err, Error::PromptTemplate(_)));
}

#[tokio::test]
async fn test_proofread_requests_carry_current_result() {
    let captured = Arc::new(Mutex::new(None::<JobRequest>));

    struct CapturingClient(Arc<Mutex<Option<JobRequest>>>);

    #[async_trait]
    impl JobClient for CapturingClient {
        fn info(&self) -> ClientInfo {
            ClientInfo {
                name: "capturing-mock",
                requires_api_key: false,
                supports_streaming: false,
            }
        }

        async fn run(
            &self,
            request: &JobRequest,
            _token: &CancellationToken,
            _on_delta: DeltaSink<'_>,
        ) -> Result<String> {
            *self.0.lock().expect("capture lock poisoned") = Some(request.clone());
            Ok("polished".to_string())
        }
    }

    let workbench = workbench_with(
        Arc::new(CapturingClient(Arc::clone(&captured))),
        "source paragraph",
    );
    workbench.set_result(0, "rough draft").expect("unit exists");

    workbench
        .toggle_unit(0, JobKind::Proofread, None)
        .await
        .expect("job should succeed");

    let request = captured
        .lock()
        .expect("capture lock poisoned")
        .clone()
        .expect("request captured");
    assert_eq!(request.kind, JobKind::Proofread);
    assert_eq!(request.current_result.as_deref(), Some("rough draft"));
    assert!(request.prompt_template.contains("{{translation}}"));
}
