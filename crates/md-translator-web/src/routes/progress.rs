//! Progress routes - save and restore translation state.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use md_translator_core::ProgressRecord;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::helpers::{OptionExt, RouteResult};
use crate::state::AppState;

/// Snapshot the session's units as progress records.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> RouteResult<Json<Vec<ProgressRecord>>> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    Ok(Json(workbench.progress()))
}

/// Replace the session's units from saved progress records.
///
/// In-flight jobs are cancelled first; a batch run must not be active.
pub async fn load_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(records): Json<Vec<ProgressRecord>>,
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
            "Cannot load progress during a batch run".to_string(),
        ));
    }

    let unit_count = workbench.load_progress(&records);
    info!("Session {} restored {} units", session_id, unit_count);

    Ok(Json(json!({ "status": "loaded", "unit_count": unit_count })))
}
