use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::error::PipelineError;

/// A prompt that passed validation: never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest(String);

impl PromptRequest {
    pub fn new(text: impl Into<String>) -> Result<Self, PipelineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PipelineError::MissingPrompt);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn into_inner(self) -> String { self.0 }
}

/// A persisted prompt/image pair as the history service stores it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub prompt: String,
    pub image_url: String,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image_url: image_url.into() }
    }
}

/// Skip/limit window into the server's newest-first ordering.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    pub skip: usize,
    pub limit: usize,
}

impl HistoryPage {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(skip: usize, limit: usize) -> Self {
        // limit must stay positive
        Self { skip, limit: limit.max(1) }
    }

    pub fn latest() -> Self { Self::new(0, 1) }
}

impl Default for HistoryPage {
    fn default() -> Self { Self::new(0, Self::DEFAULT_LIMIT) }
}

/// Shape of the inference endpoint's `output`, resolved once at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    Scalar(String),
    Sequence(Vec<String>),
}

impl RawOutput {
    pub fn from_value(value: Option<Value>) -> Result<Self, PipelineError> {
        match value {
            None | Some(Value::Null) => Err(PipelineError::EmptyOutput),
            Some(Value::String(s)) => Ok(RawOutput::Scalar(s)),
            Some(Value::Array(items)) => {
                let mut items = items.into_iter();
                match items.next() {
                    None => Ok(RawOutput::Sequence(Vec::new())),
                    // only element 0 is ever used; non-string tail elements are dropped
                    Some(Value::String(first)) => Ok(RawOutput::Sequence(
                        std::iter::once(first)
                            .chain(items.filter_map(|item| match item {
                                Value::String(s) => Some(s),
                                _ => None,
                            }))
                            .collect(),
                    )),
                    Some(other) => Err(PipelineError::InvalidReference(other.to_string())),
                }
            }
            Some(other) => Err(PipelineError::InvalidReference(other.to_string())),
        }
    }

    /// First element of a sequence, or the scalar itself.
    pub fn into_reference(self) -> Result<String, PipelineError> {
        let candidate = match self {
            RawOutput::Scalar(s) => s,
            RawOutput::Sequence(items) => items
                .into_iter()
                .next()
                .ok_or_else(|| PipelineError::InvalidReference("[]".into()))?,
        };
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidReference(candidate));
        }
        Ok(trimmed.to_string())
    }
}

// --- Local API payloads ---

#[derive(Debug, Deserialize, Clone)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}
