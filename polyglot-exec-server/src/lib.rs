use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use polyglot_exec::{
    catalog, template, BackendReadiness, EngineConfig, ExecutionDispatcher, ExecutionRequest,
    ExecutionResult, LanguageInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Language '{0}' is not supported")]
    LanguageNotFound(String),
    #[error("Engine error: {0}")]
    Engine(#[from] polyglot_exec::Error),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::LanguageNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Engine(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::ServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    pub stdin: Option<String>,
    /// Milliseconds
    pub time_limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct LanguageList {
    pub languages: Vec<LanguageInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub language_id: String,
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct RuntimeStatus {
    pub ready: bool,
    pub readiness: BackendReadiness,
    pub available_slots: usize,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub started: bool,
    pub readiness: BackendReadiness,
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<ExecutionDispatcher>,
}

/// Build the engine with the default process backends
pub fn build_dispatcher(config: EngineConfig) -> Result<Arc<ExecutionDispatcher>, ServerError> {
    Ok(Arc::new(ExecutionDispatcher::new(config)?))
}

pub fn create_app(dispatcher: Arc<ExecutionDispatcher>) -> Router {
    let state = AppState { dispatcher };
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(health_check))
        .route("/languages", get(list_languages))
        .route("/languages/:id/template", get(language_template))
        .route("/execute", post(execute))
        .route("/runtime", get(runtime_status))
        .route("/runtime/reload", post(reload_runtime))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting polyglot execution server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_languages() -> Json<LanguageList> {
    Json(LanguageList {
        languages: catalog(),
    })
}

async fn language_template(Path(id): Path<String>) -> Result<Json<TemplateResponse>, ServerError> {
    let language = id
        .parse::<polyglot_exec::Language>()
        .map_err(|_| ServerError::LanguageNotFound(id.clone()))?;
    let template = template(&id).ok_or_else(|| ServerError::LanguageNotFound(id.clone()))?;

    Ok(Json(TemplateResponse {
        language_id: language.id().to_string(),
        template: template.to_string(),
    }))
}

async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    let request = ExecutionRequest {
        language: payload.language,
        code: payload.code,
        time_limit_ms: payload.time_limit,
        stdin: payload.stdin,
    };

    // failures are part of the result, never an HTTP error
    let result = state.dispatcher.execute(request).await;
    let summary = result.summary();
    Json(ExecuteResponse { result, summary })
}

async fn runtime_status(State(state): State<AppState>) -> Json<RuntimeStatus> {
    let readiness = state.dispatcher.runtime_readiness();
    Json(RuntimeStatus {
        ready: readiness.is_ready(),
        readiness,
        available_slots: state.dispatcher.available_slots(),
    })
}

async fn reload_runtime(State(state): State<AppState>) -> Json<ReloadResponse> {
    let started = state.dispatcher.reload_runtime();
    if started {
        info!("interpreter runtime reload requested");
    }
    Json(ReloadResponse {
        started,
        readiness: state.dispatcher.runtime_readiness(),
    })
}
