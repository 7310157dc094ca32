use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn, error};

use crate::{
    config::ReplicateConfig,
    error::{ConfigError, PipelineError},
    models::{PromptRequest, RawOutput},
};

/// Turns a prompt into a single image reference.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &PromptRequest) -> Result<String, PipelineError>;
}

/// `owner/name` or `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl FromStr for ModelRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidModel(s.to_string());
        let (path, version) = match s.trim().split_once(':') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            Some(_) => return Err(invalid()),
            None => (s.trim(), None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self { owner: owner.to_string(), name: name.to_string(), version })
    }
}

pub struct ReplicateClient {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    model: ModelRef,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(config: &ReplicateConfig) -> Self {
        if config.api_token.is_none() {
            warn!("⚠️ REPLICATE_API_TOKEN is not set, inference requests will be unauthenticated");
        }
        Self {
            client: Client::new(),
            api_token: config.api_token.clone(),
            base_url: config.api_base.clone(),
            model: config.model.clone(),
            poll_interval: config.poll_interval,
        }
    }

    fn create_request(&self, prompt: &str) -> (String, Value) {
        match &self.model.version {
            Some(version) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": { "prompt": prompt } }),
            ),
            None => (
                format!("{}/models/{}/{}/predictions", self.base_url, self.model.owner, self.model.name),
                json!({ "input": { "prompt": prompt } }),
            ),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, PipelineError> {
        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ Replicate error response: {}", error_body);
            return Err(PipelineError::GenerationRequestFailed(format!("status={} body={}", status, error_body)));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| PipelineError::GenerationRequestFailed(format!("parse error: {}", e)))
    }

    async fn run_prediction(&self, prompt: &str) -> Result<Option<Value>, PipelineError> {
        let (url, body) = self.create_request(prompt);
        info!("🔗 Creating prediction at: {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationRequestFailed(e.to_string()))?;

        let mut prediction = Self::read_prediction(response).await?;

        while prediction.status.is_pending() {
            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .ok_or_else(|| PipelineError::GenerationRequestFailed(format!("prediction {} is {:?} with no poll url", prediction.id, prediction.status)))?;

            info!("⏳ Prediction {} is {:?}, polling again", prediction.id, prediction.status);
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .authorize(self.client.get(&poll_url))
                .send()
                .await
                .map_err(|e| PipelineError::GenerationRequestFailed(e.to_string()))?;
            prediction = Self::read_prediction(response).await?;
        }

        match prediction.status {
            PredictionStatus::Succeeded => Ok(prediction.output),
            status => {
                let reason = match prediction.error {
                    Some(Value::String(msg)) => msg,
                    Some(other) if !other.is_null() => other.to_string(),
                    _ => "no error detail".to_string(),
                };
                error!("❌ Prediction {} ended as {:?}: {}", prediction.id, status, reason);
                Err(PipelineError::GenerationRequestFailed(format!("prediction {:?}: {}", status, reason)))
            }
        }
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn generate(&self, prompt: &PromptRequest) -> Result<String, PipelineError> {
        info!("🎯 Generating image for prompt: {}", preview(prompt.as_str(), 80));

        let output = self.run_prediction(prompt.as_str()).await?;
        let result = RawOutput::from_value(output).and_then(RawOutput::into_reference);
        match &result {
            Ok(image_url) => info!("✅ Generated image: {}", image_url),
            Err(e) => error!("❌ Unusable generation output: {}", e),
        }
        result
    }
}

fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    fn is_pending(self) -> bool {
        matches!(self, PredictionStatus::Starting | PredictionStatus::Processing)
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}
