use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Kind of work a job performs on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Translate,
    Proofread,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Translate => f.write_str("translate"),
            Self::Proofread => f.write_str("proofread"),
        }
    }
}

/// Everything a client needs to run one job against one unit.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub kind: JobKind,
    /// Source text of the unit being worked on
    pub unit_text: String,
    /// Source paragraphs preceding the unit, oldest first
    pub context_before: Vec<String>,
    /// Source paragraphs following the unit
    pub context_after: Vec<String>,
    /// Prompt template with `{{text}}` (and `{{translation}}` for proofread)
    pub prompt_template: String,
    /// Current result text, consumed by proofread prompts
    pub current_result: Option<String>,
}

/// Callback receiving the accumulated snapshot after each streamed fragment.
pub type DeltaSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Information about a job client backend
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether this backend requires an API key
    pub requires_api_key: bool,
    /// Whether this backend can stream incremental deltas
    pub supports_streaming: bool,
}

/// Trait for job backends (LLM HTTP endpoints, mocks in tests).
///
/// `run` issues exactly one upstream request per invocation. Streamed
/// responses drive `on_delta` once per parsed fragment with the running
/// concatenation; the final accumulated text is returned either way.
/// Cancellation through the token yields `Error::Cancelled`, which callers
/// treat as a silent outcome rather than a failure.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Get information about this client
    fn info(&self) -> ClientInfo;

    /// Get the client name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Run one job to settlement.
    async fn run(
        &self,
        request: &JobRequest,
        token: &CancellationToken,
        on_delta: DeltaSink<'_>,
    ) -> Result<String>;
}
