use axum::{
    extract::State,
    routing::{delete, post},
    Json, Router,
};
use chrono::Utc;
use portfolio_core::{PipelineError, PortfolioAnalysis, PortfolioRequest, StockAnalysis, StockAnalysisRequest};
use serde_json::{json, Value};

use crate::{ApiResponse, AppError, AppState};

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        .route("/portfolio/analyze", post(analyze_portfolio))
        .route("/stocks/analyze", post(analyze_stocks))
        .route("/cache/clear", delete(clear_cache))
}

/// The analysis runs as its own task: if the transport timeout drops this
/// handler, the computation still completes and lands in the cache.
async fn analyze_portfolio(
    State(state): State<AppState>,
    Json(req): Json<PortfolioRequest>,
) -> Result<Json<ApiResponse<PortfolioAnalysis>>, AppError> {
    let engine = state.engine.clone();
    let analysis = tokio::spawn(async move { engine.analyze_portfolio(&req).await })
        .await
        .map_err(|e| PipelineError::Internal(format!("analysis task failed: {}", e)))??;

    Ok(Json(ApiResponse::success(analysis.as_ref().clone())))
}

async fn analyze_stocks(
    State(state): State<AppState>,
    Json(req): Json<StockAnalysisRequest>,
) -> Result<Json<ApiResponse<StockAnalysis>>, AppError> {
    let engine = state.engine.clone();
    let analysis = tokio::spawn(async move { engine.analyze_stocks(&req).await })
        .await
        .map_err(|e| PipelineError::Internal(format!("stock analysis task failed: {}", e)))??;

    Ok(Json(ApiResponse::success(analysis)))
}

async fn clear_cache(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let removed = state.engine.clear_cache();
    Json(ApiResponse::success(json!({
        "removed": removed,
        "message": format!("Cleared {} cached analyses", removed),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
