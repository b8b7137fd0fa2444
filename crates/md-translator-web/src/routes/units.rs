//! Unit routes - listing and direct editing of translation units.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use md_translator_core::Error;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{UnitUpdateBody, UnitView};
use crate::helpers::{OptionExt, RouteResult};
use crate::state::AppState;

/// List all units of a session with their current results.
pub async fn list_units(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> RouteResult<Json<Vec<UnitView>>> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    let views = workbench
        .units()
        .into_iter()
        .enumerate()
        .map(|(id, unit)| UnitView {
            id,
            source_text: unit.source_text,
            result_text: unit.result_text,
            active: workbench.is_unit_active(id),
        })
        .collect();

    Ok(Json(views))
}

/// Directly edit a unit's result text.
///
/// Rejected with 409 Conflict while a job owns the unit; only the owning
/// job may write during that window.
pub async fn update_unit(
    State(state): State<Arc<AppState>>,
    Path((session_id, unit_id)): Path<(String, usize)>,
    Json(body): Json<UnitUpdateBody>,
) -> RouteResult<Json<Value>> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    workbench.set_result(unit_id, body.text).map_err(|e| {
        let status = match e {
            Error::UnitBusy(_) => StatusCode::CONFLICT,
            Error::UnknownUnit(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    })?;

    Ok(Json(json!({ "status": "updated" })))
}
