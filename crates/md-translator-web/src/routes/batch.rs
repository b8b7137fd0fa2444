//! Batch routes - run a job over every unfilled unit with progress tracking.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use md_translator_core::{BatchProgress, JobKind};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::JobBody;
use crate::helpers::{OptionExt, ResultExt, RouteResult};
use crate::state::{AppState, BatchJob};

/// Start a batch run over every unit still needing work.
///
/// Returns 202 Accepted with the planned unit count; progress is observed
/// through the SSE stream route. A second start while a run is active is
/// rejected with 409 Conflict.
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Option<Json<JobBody>>,
) -> RouteResult<(StatusCode, Json<Value>)> {
    let session_ref = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?;

    let workbench = session_ref
        .workbench()
        .await
        .or_not_found("Session not found")?;

    // Claim the slot before publishing the tracking job: two concurrent
    // starts can never both pass, and only the winner's job record is ever
    // visible on the stream route
    workbench.claim_batch().or_conflict()?;

    let kind = body.map_or(JobKind::Translate, |Json(b)| b.kind());
    let planned = workbench
        .units()
        .iter()
        .filter(|u| u.needs_work())
        .count();

    let job = Arc::new(BatchJob::new(planned));
    let published = session_ref
        .with_session_mut(|s| s.batch_job = Some(Arc::clone(&job)))
        .await;
    if published.is_none() {
        // Session evicted since the claim; give the slot back
        workbench.release_batch();
        return Err((StatusCode::NOT_FOUND, "Session not found".to_string()));
    }

    // Spawn background batch task; the claim is consumed by the run
    let task_job = Arc::clone(&job);
    tokio::spawn(async move {
        let progress_job = Arc::clone(&task_job);
        let on_progress = move |progress: BatchProgress| {
            progress_job.record_progress(progress.unit_id, progress.completed);
        };

        let report = workbench
            .run_claimed_batch(kind, None, Some(&on_progress))
            .await;
        if report.has_failures() {
            let summary = report
                .failed
                .iter()
                .map(|(unit_id, e)| format!("unit {unit_id}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            task_job.set_error(summary).await;
        }
        task_job.mark_done(report.completed, report.stopped);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "kind": kind, "planned": planned })),
    ))
}

/// Request cooperative termination of the active batch run.
///
/// The in-flight unit drains; remaining units are skipped. Returns 202
/// because completion is observed on the SSE stream, not here.
pub async fn stop_batch(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> RouteResult<(StatusCode, Json<Value>)> {
    let workbench = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?
        .workbench()
        .await
        .or_not_found("Session not found")?;

    if !workbench.batch_active() {
        return Err((StatusCode::CONFLICT, "No active batch run".to_string()));
    }

    workbench.request_stop();
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "stopping" }))))
}

/// SSE stream of batch progress updates.
///
/// Pushes a JSON event whenever progress changes, then a final event with
/// `done: true` and closes.
#[allow(tail_expr_drop_order)] // Drop order change in async_stream macro is harmless here
pub async fn batch_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let session_ref = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?;

    let job = session_ref
        .with_session(|s| s.batch_job.clone())
        .await
        .or_not_found("Session not found")?
        .or_not_found("No active batch run")?;

    let stream = async_stream::stream! {
        let mut last_completed = usize::MAX;

        loop {
            let completed = job.completed.load(Ordering::SeqCst);
            let done = job.done.load(Ordering::SeqCst);

            // Only send an update if progress changed or the run is done
            if completed != last_completed || done {
                last_completed = completed;

                let error = job.get_error().await;
                let payload = json!({
                    "completed": completed,
                    "planned": job.planned.load(Ordering::SeqCst),
                    "current_unit": job.current_unit.load(Ordering::SeqCst),
                    "done": done,
                    "stopped": job.stopped.load(Ordering::SeqCst),
                    "error": error,
                });

                yield Ok(Event::default().event("progress").data(payload.to_string()));

                if done {
                    break;
                }
            }

            // Check for updates every 100ms (but only send when changed)
            let sleep_future = tokio::time::sleep(Duration::from_millis(100));
            sleep_future.await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
