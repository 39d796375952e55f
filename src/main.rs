mod amazon;
mod backend;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use backend::BackendClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, CreateLinksResponse, ExtractRequest, ExtractResponse, ProcessContentRequest,
    ProcessContentResponse,
};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "linkmint.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let openapi_raw = include_str!("../docs/openapi.yaml");
    let openapi: serde_json::Value =
        serde_yaml::from_str(openapi_raw).unwrap_or(serde_json::json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");

    let state = AppState {
        pipeline: Pipeline::from_env(),
        backend: BackendClient::from_env(),
        openapi: Arc::new(openapi),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/extract", post(extract))
        .route("/process-content", post(process_content))
        .route("/create-links", post(create_links))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "linkmint.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    backend: BackendClient,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "linkmint-api-rs",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Linkmint API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

async fn metrics_endpoint(State(state): State<AppState>) -> axum::http::Response<String> {
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

/// Extract product mentions and resolve them to affiliate links.
///
/// - Method: `POST`
/// - Path: `/extract`
/// - Body: `ExtractRequest`
/// - Response: `ExtractResponse`
async fn extract(
    State(state): State<AppState>,
    Json(payload): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    crate::metrics::inc_requests("/extract");
    let product_list = state.pipeline.resolve_transcript(&payload.transcript).await?;
    Ok(Json(ExtractResponse {
        customer_id: payload.customer_id,
        customer_name: payload.customer_name,
        product_list,
    }))
}

/// Full workflow: extract, resolve, mint custom links, inject into content.
/// The transcript doubles as the markdown content handed to the backend.
///
/// - Method: `POST`
/// - Path: `/process-content`
/// - Body: `ProcessContentRequest`
/// - Response: `ProcessContentResponse`
async fn process_content(
    State(state): State<AppState>,
    Json(payload): Json<ProcessContentRequest>,
) -> Result<Json<ProcessContentResponse>, AppError> {
    crate::metrics::inc_requests("/process-content");
    let product_list = state.pipeline.resolve_transcript(&payload.transcript).await?;

    let content = state
        .backend
        .process_content(
            &payload.customer_id,
            &payload.customer_name,
            &payload.transcript,
            &product_list,
            payload.use_gemini,
        )
        .await
        .map_err(|err| PipelineError::upstream("backend", err.to_string()))?;

    Ok(Json(ProcessContentResponse {
        customer_id: payload.customer_id,
        customer_name: payload.customer_name,
        content,
        products_found: product_list.len(),
    }))
}

/// Extract, resolve, and mint custom links without touching any content.
///
/// - Method: `POST`
/// - Path: `/create-links`
/// - Body: `ExtractRequest`
/// - Response: `CreateLinksResponse`
async fn create_links(
    State(state): State<AppState>,
    Json(payload): Json<ExtractRequest>,
) -> Result<Json<CreateLinksResponse>, AppError> {
    crate::metrics::inc_requests("/create-links");
    let product_list = state.pipeline.resolve_transcript(&payload.transcript).await?;

    let custom_links = state
        .backend
        .create_custom_links(&payload.customer_id, &payload.customer_name, &product_list)
        .await
        .map_err(|err| PipelineError::upstream("backend", err.to_string()))?;

    let products = backend::merge_custom_links(&product_list, &custom_links)
        .map_err(|err| PipelineError::upstream("backend", err.to_string()))?;

    Ok(Json(CreateLinksResponse {
        customer_id: payload.customer_id,
        customer_name: payload.customer_name,
        products,
    }))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
