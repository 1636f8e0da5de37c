use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use portfolio_core::PipelineError;
use portfolio_engine::{EngineConfig, PortfolioEngine};
use price_client::YahooClient;
use sentiment_analysis::CsvSentimentSource;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

pub mod config;
mod portfolio_routes;
mod system_routes;

pub use config::ServerConfig;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PortfolioEngine>,
    pub config: ServerConfig,
}

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error; the only place pipeline failures become user-facing
/// messages and status codes.
#[derive(Debug)]
pub enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Pipeline(PipelineError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, format!("Invalid request: {}", msg))
            }
            AppError::Pipeline(PipelineError::EmptyComposition) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "No qualifying sentiment data: the portfolio composition is empty".to_string(),
            ),
            AppError::Pipeline(PipelineError::DataSource(msg)) => {
                (StatusCode::BAD_GATEWAY, format!("Data source error: {}", msg))
            }
            AppError::Pipeline(PipelineError::Internal(msg)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {}", msg))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, message);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, message);
        }
        (status, Json(ApiResponse::error(message))).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    Router::new()
        .merge(system_routes::system_routes())
        .merge(portfolio_routes::portfolio_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn,tower_http=info")
        })
    };

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let server_config = ServerConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    tracing::info!(
        "Engine config: batch size {}, {} workers, rebalance batch {}, excluded {:?}",
        engine_config.fetch_batch_size,
        engine_config.fetch_max_workers,
        engine_config.rebalance_batch_size,
        engine_config.excluded_symbols
    );

    let engine = PortfolioEngine::new(
        engine_config,
        Arc::new(YahooClient::new()),
        Arc::new(CsvSentimentSource::new()),
    );
    let state = AppState {
        engine: Arc::new(engine),
        config: server_config.clone(),
    };

    let addr = server_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Sentiment portfolio API listening on http://{}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
