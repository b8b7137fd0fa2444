//! Single-unit job route - cancel-or-start toggle semantics.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use md_translator_core::{Error, JobKind, UnitOutcome};
use std::sync::Arc;

use super::{JobBody, JobOutcomeView};
use crate::helpers::{OptionExt, RouteResult};
use crate::state::AppState;

/// Toggle a job for one unit.
///
/// If a job is already running for the unit it is cancelled and the request
/// returns `cancelled`; otherwise a new job runs to settlement and the
/// final text is returned. Clients cancel a long-running unit by POSTing
/// the same URL again.
pub async fn toggle_unit_job(
    State(state): State<Arc<AppState>>,
    Path((session_id, unit_id)): Path<(String, usize)>,
    body: Option<Json<JobBody>>,
) -> RouteResult<Json<JobOutcomeView>> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    let kind = body.map_or(JobKind::Translate, |Json(b)| b.kind());

    let outcome = workbench
        .toggle_unit(unit_id, kind, None)
        .await
        .map_err(|e| {
            let status = match e {
                Error::UnknownUnit(_) => StatusCode::NOT_FOUND,
                Error::PromptTemplate(_) | Error::ConfigMissing(_) => StatusCode::BAD_REQUEST,
                Error::Upstream { .. } | Error::Request(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })?;

    let view = match outcome {
        UnitOutcome::Completed(text) => JobOutcomeView {
            status: "completed",
            text: Some(text),
        },
        UnitOutcome::Cancelled => JobOutcomeView {
            status: "cancelled",
            text: None,
        },
    };

    Ok(Json(view))
}
