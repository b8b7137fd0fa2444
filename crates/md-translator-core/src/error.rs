use thiserror::Error;

/// Unified error type for md-translator-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Configuration (missing credentials, malformed prompt templates)
/// - Upstream API failures (non-2xx responses, transport errors)
/// - Streaming (malformed frames, unparseable combined output)
/// - Job coordination (cancellation, registry invariants, batch state)
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    /// Missing required configuration field
    #[error("missing required config field: {0}")]
    ConfigMissing(String),

    /// Prompt template has the wrong number of placeholder occurrences
    #[error("invalid prompt template: {0}")]
    PromptTemplate(String),

    // ==========================================================================
    // Upstream API Errors
    // ==========================================================================
    /// Non-2xx HTTP response from the provider; body is surfaced verbatim
    #[error("upstream API error (HTTP {status}): {body}")]
    Upstream { status: u16, body: String },

    /// Transport-level request failure (connection refused, DNS, TLS, ...)
    #[error("request failed: {0}")]
    Request(String),

    /// Response arrived but could not be interpreted as a result
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    // ==========================================================================
    // Streaming Errors
    // ==========================================================================
    /// The combined streamed output could not be parsed at all
    #[error("failed to parse streamed response: {0}")]
    StreamParse(String),

    // ==========================================================================
    // Job Coordination Errors
    // ==========================================================================
    /// Job was cancelled by the caller. Never an error condition for the UI;
    /// callers match on this to suppress error reporting.
    #[error("job cancelled")]
    Cancelled,

    /// Unit is owned by an in-flight job and cannot be edited directly
    #[error("unit {0} has an active job")]
    UnitBusy(usize),

    /// Unit id outside the current document's sequence
    #[error("unknown unit id {0}")]
    UnknownUnit(usize),

    /// A batch run is already active for this document
    #[error("a batch run is already active")]
    BatchAlreadyRunning,

    /// Registry bookkeeping violated single-flight; indicates a bug, not a
    /// recoverable runtime condition
    #[error("registry invariant violated: {0}")]
    Invariant(String),

    // ==========================================================================
    // Progress / I/O Errors
    // ==========================================================================
    /// Failed to parse a saved progress document
    #[error("failed to load progress: {0}")]
    ProgressLoad(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for user-initiated aborts, which are silent no-op outcomes.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
