//! HTTP route handlers for the Markdown translator web application.
//!
//! All routes speak JSON except the export route (plain text download) and
//! the batch progress route (SSE with JSON event payloads).

mod batch;
mod export;
mod progress;
mod settings;
mod translate;
mod units;
mod upload;

pub use batch::{batch_stream, start_batch, stop_batch};
pub use export::export_document;
pub use progress::{get_progress, load_progress};
pub use settings::update_settings;
pub use translate::toggle_unit_job;
pub use units::{list_units, update_unit};
pub use upload::upload_document;

use md_translator_core::JobKind;
use serde::{Deserialize, Serialize};

/// One unit as presented to clients.
#[derive(Serialize)]
pub struct UnitView {
    pub id: usize,
    pub source_text: String,
    pub result_text: String,
    /// Whether a job currently owns this unit
    pub active: bool,
}

/// Body for direct unit edits.
#[derive(Deserialize)]
pub struct UnitUpdateBody {
    pub text: String,
}

/// Body for job and batch starts; kind defaults to translate.
#[derive(Deserialize, Default)]
pub struct JobBody {
    #[serde(default)]
    pub kind: Option<JobKind>,
}

impl JobBody {
    pub fn kind(&self) -> JobKind {
        self.kind.unwrap_or(JobKind::Translate)
    }
}

/// Outcome of a single-unit toggle.
#[derive(Serialize)]
pub struct JobOutcomeView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Settings update; absent fields are left unchanged.
#[derive(Deserialize)]
pub struct SettingsBody {
    pub translate_prompt: Option<String>,
    pub proofread_prompt: Option<String>,
    pub batch_delay_ms: Option<u64>,
}
