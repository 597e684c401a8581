use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::retry::RetryOrchestrator;
use crate::transcript::youtube::YoutubeSource;
use crate::transcript::FetchClient;
use crate::TranscriptError;

/// Shared, read-only state handed to every request
pub struct AppState {
    pub orchestrator: RetryOrchestrator,
    pub languages: Vec<String>,
}

/// Wire the proxy strategy and the YouTube source into a shared state
pub fn build_state(config: &Config) -> Arc<AppState> {
    let strategy = config.proxy_strategy();
    tracing::info!(proxy_mode = strategy.label(), "Proxy strategy resolved");

    let source = YoutubeSource::new(config.attempt_timeout());
    let client = FetchClient::new(Arc::new(strategy), Arc::new(source));

    Arc::new(AppState {
        orchestrator: RetryOrchestrator::new(Arc::new(client)),
        languages: config.fetch.languages.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct TranscriptQuery {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    pub video_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    proxy_mode: &'static str,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Transcript(#[from] TranscriptError),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Transcript(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            detail: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TranscriptQuery>,
) -> ApiResult<Json<TranscriptResponse>> {
    let video_id = query
        .video_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required query parameter: videoId".to_string()))?;

    tracing::info!(video_id = %video_id, "Transcript requested");

    let text = state
        .orchestrator
        .fetch_with_retry(&video_id, &state.languages)
        .await?;

    Ok(Json(TranscriptResponse { video_id, text }))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        proxy_mode: state.orchestrator.client().strategy().label(),
    })
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = &config.server.cors_allow_origins;
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

/// Build the router. The transcript route answers on `/`, `/transcript` and `/api/transcript`.
pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/", get(get_transcript))
        .route("/transcript", get(get_transcript))
        .route("/api/transcript", get(get_transcript))
        .route("/healthz", get(healthz))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: Arc<AppState>, config: &Config) -> anyhow::Result<()> {
    let router = app_router(state, config);
    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    tracing::info!("Listening on {}", config.server.listen_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
