//! Service metadata, health and configuration status.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{ApiResponse, AppState};

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
}

async fn root() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "service": "Sentiment Portfolio Analysis API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "status": "GET /status",
            "analyzePortfolio": "POST /portfolio/analyze",
            "analyzeStocks": "POST /stocks/analyze",
            "clearCache": "DELETE /cache/clear",
        }
    })))
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "cacheSize": state.engine.cache_len(),
    })))
}

async fn status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let engine = state.engine.config();
    Json(ApiResponse::success(json!({
        "fetchBatchSize": engine.fetch_batch_size,
        "fetchMaxWorkers": engine.fetch_max_workers,
        "rebalanceBatchSize": engine.rebalance_batch_size,
        "excludedSymbols": engine.excluded_symbols,
        "cacheEntries": state.engine.cache_len(),
        "requestTimeoutSecs": state.config.request_timeout_secs,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
