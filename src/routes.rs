use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::PipelineError,
    models::{ErrorBody, GenerateRequest, GenerateResponse, HistoryEntry, PromptRequest},
    orchestrator::Orchestrator,
    replicate::ImageGenerator,
    state::{Phase, ViewState},
};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn ImageGenerator>,
    pub session: Arc<Orchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/session", get(get_session))
        .route("/api/session/prompt", post(submit_prompt))
        .route("/api/session/select", post(select_entry))
        .route("/api/session/history/more", post(load_more))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub prompt: String,
    pub image_url: Option<String>,
    pub loading: bool,
    pub phase: Phase,
    pub history: Vec<HistoryEntry>,
    pub error: Option<String>,
}

impl From<ViewState> for SessionView {
    fn from(state: ViewState) -> Self {
        Self {
            prompt: state.prompt,
            image_url: state.current_image,
            loading: state.loading,
            phase: state.phase,
            history: state.history,
            error: state.last_error.map(|e| e.public_message()),
        }
    }
}

fn prompt_from(body: Result<Json<GenerateRequest>, JsonRejection>) -> Result<PromptRequest, PipelineError> {
    match body {
        Ok(Json(GenerateRequest { prompt: Some(prompt) })) => PromptRequest::new(prompt),
        Ok(_) => Err(PipelineError::MissingPrompt),
        Err(rejection) => {
            tracing::warn!("⚠️ Unreadable generate body: {}", rejection);
            Err(PipelineError::MissingPrompt)
        }
    }
}

pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, PipelineError> {
    let prompt = prompt_from(body)?;
    let image_url = state.generator.generate(&prompt).await.inspect_err(|e| tracing::error!("Error: {}", e))?;
    Ok(Json(GenerateResponse { image_url }))
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.snapshot().into())
}

#[axum::debug_handler]
pub async fn submit_prompt(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let prompt = match prompt_from(body) {
        Ok(prompt) => prompt.into_inner(),
        Err(e) => return e.into_response(),
    };

    // Spawned so the cycle runs to completion even if the caller goes away.
    let session = state.session.clone();
    let task = tokio::spawn(async move { session.submit_prompt(&prompt).await });
    match task.await {
        Ok(Ok(_)) => Json(SessionView::from(state.session.snapshot())).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(join_error) => {
            tracing::error!("❌ Submission task panicked: {}", join_error);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: "Submission failed".into() })).into_response()
        }
    }
}

pub async fn select_entry(State(state): State<AppState>, Json(entry): Json<HistoryEntry>) -> Json<SessionView> {
    state.session.select_history_entry(entry);
    Json(state.session.snapshot().into())
}

pub async fn load_more(State(state): State<AppState>) -> Json<SessionView> {
    state.session.load_more_history().await;
    Json(state.session.snapshot().into())
}
