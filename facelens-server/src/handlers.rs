//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{error, info, warn};

use crate::response::{
    INTERNAL_ERROR, INVALID_UPLOAD, MISSING_FILE, error_response, prediction_error_response,
};
use crate::state::AppState;

/// Multipart field carrying the uploaded image.
pub const FILE_FIELD: &str = "file";

/// `POST /predict/`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("Rejected upload: {rejection}");
            return error_response(rejection.status(), INVALID_UPLOAD);
        }
    };

    let bytes = match read_file_field(&mut multipart).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!("Upload has no `{FILE_FIELD}` field");
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, MISSING_FILE);
        }
        Err(err) => {
            warn!("Failed to read upload: {err}");
            return error_response(err.status(), INVALID_UPLOAD);
        }
    };

    let size = bytes.len();
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict_bytes(&bytes)).await;

    match outcome {
        Ok(Ok(prediction)) => {
            info!(
                "Predicted {} / {} for {size} byte upload",
                prediction.gender, prediction.age_range
            );
            (StatusCode::OK, Json(prediction)).into_response()
        }
        Ok(Err(err)) => {
            if err.is_client_error() {
                info!("Prediction rejected for {size} byte upload: {err}");
            }
            prediction_error_response(&err, state.strict_status_codes)
        }
        Err(join_err) => {
            error!("Prediction worker failed: {join_err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// `GET /health`
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Return the contents of the first `file` field, skipping any other fields.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return field.bytes().await.map(Some);
        }
    }
    Ok(None)
}
