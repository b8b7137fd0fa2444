//! Upload route - Markdown document upload handling.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use md_translator_core::Workbench;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::helpers::{ResultExt, RouteResult};
use crate::state::AppState;

/// Upload a Markdown file - creates a session and returns its ID.
///
/// The file is parsed into translatable paragraphs immediately; paragraphs
/// shorter than the minimum length are dropped at parse time.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> RouteResult<Json<Value>> {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("document.md").to_string();
            let content = field.text().await.or_bad_request()?;

            let workbench = Workbench::new(state.config.clone());
            let unit_count = workbench.load_document(&content);
            if unit_count == 0 {
                return Err((
                    StatusCode::BAD_REQUEST,
                    "No translatable paragraphs found".to_string(),
                ));
            }

            let session_id = state.create_session(workbench, filename.clone()).await;
            info!(
                "Created session {} for {} ({} units)",
                session_id, filename, unit_count
            );

            return Ok(Json(json!({
                "session_id": session_id,
                "filename": filename,
                "unit_count": unit_count,
            })));
        }
    }

    Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))
}
