use thiserror::Error;

/// Outcome of a prediction that did not produce a result.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The upload could not be decoded as an image.
    #[error("Invalid image")]
    InvalidImage,
    /// No usable face was found.
    #[error("No face detected")]
    NoFace,
    /// The model runtime failed.
    #[error(transparent)]
    Inference(#[from] anyhow::Error),
}

impl PredictError {
    /// `true` for outcomes caused by the input rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::InvalidImage | PredictError::NoFace)
    }
}
