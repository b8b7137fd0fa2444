//! Settings routes - per-session prompt and pacing configuration.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;

use super::SettingsBody;
use crate::helpers::{OptionExt, RouteResult};
use crate::state::AppState;

/// Update session settings.
///
/// Absent fields are left unchanged. Rejected during an active batch run
/// so a sweep is never split across two prompt versions.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<SettingsBody>,
) -> RouteResult<Json<Value>> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    if workbench.batch_active() {
        return Err((
            StatusCode::CONFLICT,
            "Cannot change settings during a batch run".to_string(),
        ));
    }

    let current = workbench.config();
    workbench.set_prompts(
        body.translate_prompt.unwrap_or(current.translate_prompt),
        body.proofread_prompt.unwrap_or(current.proofread_prompt),
    );
    if let Some(delay_ms) = body.batch_delay_ms {
        workbench.set_batch_delay(delay_ms);
    }

    Ok(Json(json!({ "status": "updated" })))
}
