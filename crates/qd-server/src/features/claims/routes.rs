use std::convert::Infallible;

use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::api::response::ErrorResponse;
use crate::events::EVENT_IMPORT_PROGRESS;
use crate::features::FeatureState;
use crate::ingest::StagedFile;

const CALLER_ID_HEADER: &str = "x-caller-id";

pub fn claims_routes() -> Router<FeatureState> {
    Router::new()
        .route("/upload", post(upload_claims))
        .route("/progress", get(progress_stream))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    import_session_id: Uuid,
    queued: usize,
    job_ids: Vec<Uuid>,
}

#[tracing::instrument(skip(state, headers, multipart))]
async fn upload_claims(
    State(state): State<FeatureState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ClaimsApiError> {
    let caller_id = caller_from_headers(&headers).ok_or(ClaimsApiError::CallerIdRequired)?;

    let import_session_id = Uuid::new_v4();
    let session_dir = state
        .producer
        .prepare_session(import_session_id)
        .await
        .map_err(ClaimsApiError::Pipeline)?;

    let mut staged = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ClaimsApiError::Multipart(e.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            // Non-file form fields are ignored.
            continue;
        };

        // Stream the body straight to the staged file; uploads are
        // never buffered whole in memory.
        let target = state.producer.stage_target(&session_dir, &name);
        match stream_field_to_disk(&mut field, &target).await {
            Ok(()) => staged.push(target),
            Err(e) => {
                remove_partial(&target.staged_path).await;
                return Err(e);
            }
        }
    }

    if staged.is_empty() {
        return Err(ClaimsApiError::NoFiles);
    }

    let outcome = state
        .producer
        .enqueue_staged(staged, import_session_id, &caller_id)
        .await
        .map_err(ClaimsApiError::Pipeline)?;

    tracing::info!(
        import_session_id = %import_session_id,
        caller_id = %caller_id,
        queued = outcome.queued,
        "Claim upload accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            success: true,
            import_session_id,
            queued: outcome.queued,
            job_ids: outcome.job_ids,
        }),
    )
        .into_response())
}

/// Write one multipart field to its staging target chunk by chunk.
async fn stream_field_to_disk(
    field: &mut Field<'_>,
    target: &StagedFile,
) -> Result<(), ClaimsApiError> {
    let mut file = tokio::fs::File::create(&target.staged_path)
        .await
        .map_err(|e| ClaimsApiError::Pipeline(qd_common::QdError::Io(e)))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ClaimsApiError::Multipart(e.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ClaimsApiError::Pipeline(qd_common::QdError::Io(e)))?;
    }

    file.flush()
        .await
        .map_err(|e| ClaimsApiError::Pipeline(qd_common::QdError::Io(e)))
}

/// Best-effort removal of a half-written staged file.
async fn remove_partial(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProgressParams {
    caller_id: Option<String>,
}

/// Long-lived SSE stream of progress events for one caller.
async fn progress_stream(
    State(state): State<FeatureState>,
    headers: HeaderMap,
    Query(params): Query<ProgressParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ClaimsApiError> {
    let caller_id = caller_from_headers(&headers)
        .or(params.caller_id)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ClaimsApiError::CallerIdRequired)?;

    tracing::debug!(caller_id = %caller_id, "Progress stream opened");
    let rx = state.hub.subscribe(&caller_id).await;

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    let event = Event::default()
                        .event(event_name(&message))
                        .data(message.to_string());
                    return Some((Ok(event), rx));
                }
                // A lagged subscriber just misses intermediate events.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// SSE event name, taken from the published message itself so new
/// event kinds flow through without a router change.
fn event_name(message: &Value) -> &str {
    message
        .get("event")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(EVENT_IMPORT_PROGRESS)
}

fn caller_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CALLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug)]
enum ClaimsApiError {
    CallerIdRequired,
    NoFiles,
    Multipart(String),
    Pipeline(qd_common::QdError),
}

impl IntoResponse for ClaimsApiError {
    fn into_response(self) -> Response {
        match self {
            ClaimsApiError::CallerIdRequired => {
                let error = ErrorResponse::new(
                    "VALIDATION_ERROR",
                    "x-caller-id header (or caller_id query parameter) is required",
                );
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            }
            ClaimsApiError::NoFiles => {
                let error =
                    ErrorResponse::new("VALIDATION_ERROR", "No files found in multipart data");
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            }
            ClaimsApiError::Multipart(msg) => {
                let error = ErrorResponse::new(
                    "VALIDATION_ERROR",
                    format!("Failed to read multipart data: {msg}"),
                );
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            }
            ClaimsApiError::Pipeline(e) => {
                tracing::error!("Upload failed: {}", e);
                let error = ErrorResponse::new("UPLOAD_ERROR", "Failed to stage uploaded files");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_event_name_comes_from_message() {
        let message = json!({"event": "import-finalized", "data": {}});
        assert_eq!(event_name(&message), "import-finalized");
    }

    #[test]
    fn test_event_name_falls_back_for_untagged_messages() {
        assert_eq!(event_name(&json!({"data": {}})), EVENT_IMPORT_PROGRESS);
        assert_eq!(event_name(&json!({"event": ""})), EVENT_IMPORT_PROGRESS);
        assert_eq!(event_name(&json!({"event": 7})), EVENT_IMPORT_PROGRESS);
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, HeaderValue::from_static("user-7"));
        assert_eq!(caller_from_headers(&headers), Some("user-7".to_string()));
    }

    #[test]
    fn test_caller_from_headers_rejects_blank() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(caller_from_headers(&headers), None);
        assert_eq!(caller_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_responses_carry_status() {
        assert_eq!(
            ClaimsApiError::CallerIdRequired.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ClaimsApiError::NoFiles.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ClaimsApiError::Pipeline(qd_common::QdError::Database("down".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
