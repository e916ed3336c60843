//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::FrameError(inner) => format!("Frame failed and was rolled back: {}", inner),
        other => other.to_string(),
    }
}
