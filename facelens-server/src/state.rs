use std::sync::Arc;

use facelens_core::InferencePipeline;
use facelens_utils::config::ServerSettings;

/// Shared, read-only state handed to every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub strict_status_codes: bool,
}

impl AppState {
    pub fn new(pipeline: InferencePipeline, settings: &ServerSettings) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            strict_status_codes: settings.strict_status_codes,
        }
    }
}
