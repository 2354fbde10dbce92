pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{classify::ClassificationPipeline, models::ModelManager, utils::error::ClassifyError, Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: ClassificationPipeline,
    pub jobs: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<ModelManager>) -> Self {
        let jobs = Arc::new(Semaphore::new(config.server_config.max_concurrent_jobs.max(1)));
        Self {
            config,
            pipeline: ClassificationPipeline::new(manager),
            jobs,
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 启动时加载并缓存全部模型
    let manager = ModelManager::init(config.clone())?;

    let app = create_app(AppState::new(config.clone(), manager));

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ClassifyError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /classify        - JSON base64 upload");
    tracing::info!("  POST /classify/upload - Multipart file upload");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/info        - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ClassifyError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ClassifyError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        .route("/classify", post(handlers::classify_json_handler))
        .route("/classify/upload", post(handlers::classify_upload_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // axum默认2MB限制，改由RequestBodyLimitLayer统一控制
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.pipeline.manager().health_check()?;
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.manager().get_stats();
    Json(json!({
        "service": "Photo Classification Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": stats,
        "processing": {
            "preprocess": state.config.processing.preprocess,
            "target_size": state.config.processing.target_size,
            "contrast": state.config.processing.contrast,
            "top_k": state.config.processing.top_k,
        }
    }))
}
