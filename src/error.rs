use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use thiserror::Error;

use crate::models::ErrorBody;

pub const PROMPT_REQUIRED: &str = "Prompt is required";
pub const NO_OUTPUT: &str = "No output from image generation";
pub const INVALID_IMAGE_URL: &str = "Invalid image URL generated";
pub const GENERATION_FAILED: &str = "Failed to generate image";

/// Every failure the generation-and-history pipeline can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Prompt is required")] MissingPrompt,
    #[error("No output from image generation")] EmptyOutput,
    #[error("Invalid image URL generated: {0:?}")] InvalidReference(String),
    #[error("generation request failed: {0}")] GenerationRequestFailed(String),
    #[error("history fetch failed: {0}")] HistoryFetchFailed(String),
    #[error("history save failed: {0}")] HistorySaveFailed(String),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::MissingPrompt => StatusCode::BAD_REQUEST,
            PipelineError::EmptyOutput
            | PipelineError::InvalidReference(_)
            | PipelineError::GenerationRequestFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::HistoryFetchFailed(_) | PipelineError::HistorySaveFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message shown to API consumers. Generation details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::MissingPrompt => PROMPT_REQUIRED.to_string(),
            PipelineError::EmptyOutput => NO_OUTPUT.to_string(),
            PipelineError::InvalidReference(_) => INVALID_IMAGE_URL.to_string(),
            PipelineError::GenerationRequestFailed(_) => GENERATION_FAILED.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.public_message() })).into_response()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")] InvalidValue { key: &'static str, value: String },
    #[error("invalid model reference {0:?}, expected owner/name[:version]")] InvalidModel(String),
}
