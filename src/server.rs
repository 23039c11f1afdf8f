//! HTTP adapter: one multipart endpoint in front of the pipeline.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::{traits::ScoringModel, Pipeline};

/// Uploads larger than this are rejected by axum before reaching the handler.
const MAX_UPLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Build the application router around a shared pipeline.
///
/// The pipeline is process-wide read-only state; every request gets its own
/// buffers, so concurrent requests only contend on the model session lock.
pub fn router<M: ScoringModel + 'static>(pipeline: Arc<Pipeline<M>>) -> Router {
    Router::new()
        .route("/api/segment", post(segment::<M>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// POST /api/segment - multipart form with an `image` field.
///
/// Missing field: 400 with `{"error": "No file uploaded"}`. Any pipeline
/// failure: 500 with the error message. Success: the PNG-encoded overlay.
async fn segment<M: ScoringModel + 'static>(
    State(pipeline): State<Arc<Pipeline<M>>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<Bytes> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("image") {
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some(bytes);
                        break;
                    }
                    Err(err) => return error_response(err.status(), &err.to_string()),
                }
            }
            Ok(None) => break,
            Err(err) => return error_response(err.status(), &err.to_string()),
        }
    }

    let Some(data) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "No file uploaded");
    };

    debug!(bytes = data.len(), "received upload");
    let result = tokio::task::spawn_blocking(move || pipeline.segment_bytes(&data)).await;
    match result {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Err(err)) => {
            error!("segmentation failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Err(err) => {
            error!("segmentation task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "segmentation task failed")
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
