//! Export route - plain-text download of the translated document.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use std::sync::Arc;

use crate::helpers::{OptionExt, ResultExt, RouteResult};
use crate::state::AppState;

/// Download the translated document as plain text.
///
/// Only units with non-empty results are included, joined by blank lines;
/// untranslated units are silently skipped.
pub async fn export_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> RouteResult<Response> {
    let session_ref = state
        .get_session(&session_id)
        .await
        .or_not_found("Session not found")?;

    let (workbench, filename) = session_ref
        .with_session(|s| (Arc::clone(&s.workbench), s.original_filename.clone()))
        .await
        .or_not_found("Session not found")?;

    let text = workbench.export_text();

    let stem = std::path::Path::new(&filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let download_name = format!("{stem}-translated.txt");

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from(text))
        .or_internal_error()
}
