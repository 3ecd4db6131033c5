//! JSON bodies and status codes for prediction outcomes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use facelens_core::PredictError;
use log::error;
use serde::{Deserialize, Serialize};

pub const MISSING_FILE: &str = "Missing file field";
pub const INVALID_UPLOAD: &str = "Invalid upload";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// `{"error": "..."}` body shared by every failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Status code for a pipeline error.
///
/// Input problems are reported with 200 unless `strict` is set.
pub fn status_for(err: &PredictError, strict: bool) -> StatusCode {
    match err {
        PredictError::InvalidImage if strict => StatusCode::BAD_REQUEST,
        PredictError::NoFace if strict => StatusCode::UNPROCESSABLE_ENTITY,
        PredictError::InvalidImage | PredictError::NoFace => StatusCode::OK,
        PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a pipeline error into its HTTP response, logging internal failures.
pub fn prediction_error_response(err: &PredictError, strict: bool) -> Response {
    let status = status_for(err, strict);
    match err {
        PredictError::Inference(cause) => {
            error!("Prediction failed: {cause:#}");
            error_response(status, INTERNAL_ERROR)
        }
        client => error_response(status, &client.to_string()),
    }
}
