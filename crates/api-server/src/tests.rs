use super::*;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request};
use chrono::NaiveDate;
use portfolio_core::{
    EngagementRecord, PriceField, PriceHistorySource, PricePoint, SentimentSource,
};
use serde_json::Value;
use tower::ServiceExt;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct StaticPrices;

#[async_trait]
impl PriceHistorySource for StaticPrices {
    async fn fetch(
        &self,
        symbols: &[String],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PricePoint>, PipelineError> {
        let closes = [(d(2021, 1, 29), 100.0), (d(2021, 2, 1), 102.0), (d(2021, 2, 2), 101.0)];
        Ok(symbols
            .iter()
            .filter(|s| s.as_str() != "DEAD")
            .flat_map(|s| {
                closes
                    .iter()
                    .map(move |(date, value)| PricePoint::new(s.clone(), PriceField::AdjClose, *date, *value))
            })
            .collect())
    }
}

struct StaticSentiment;

#[async_trait]
impl SentimentSource for StaticSentiment {
    async fn load(&self, location: &str) -> Result<Vec<EngagementRecord>, PipelineError> {
        match location {
            "missing" => Err(PipelineError::DataSource("sentiment source unreachable".into())),
            "quiet" => Ok(Vec::new()),
            _ => Ok(vec![EngagementRecord {
                date: d(2021, 1, 6),
                symbol: "AAPL".into(),
                like_count: 100.0,
                comment_count: 30.0,
            }]),
        }
    }
}

fn test_app() -> (Router, Arc<PortfolioEngine>) {
    let engine = Arc::new(PortfolioEngine::new(
        EngineConfig::default(),
        Arc::new(StaticPrices),
        Arc::new(StaticSentiment),
    ));
    let state = AppState {
        engine: Arc::clone(&engine),
        config: ServerConfig::default(),
    };
    (app(state), engine)
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (app, _) = test_app();
    let (status, body) = call(app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["endpoints"]["analyzePortfolio"], "POST /portfolio/analyze");
}

#[tokio::test]
async fn test_health_reports_cache_size() {
    let (app, _) = test_app();
    let (status, body) = call(app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["cacheSize"], 0);
}

#[tokio::test]
async fn test_status_reports_engine_config() {
    let (app, _) = test_app();
    let (_, body) = call(app, Method::GET, "/status", None).await;
    assert_eq!(body["data"]["fetchBatchSize"], 15);
    assert_eq!(body["data"]["fetchMaxWorkers"], 4);
    assert_eq!(body["data"]["rebalanceBatchSize"], 5);
    assert_eq!(body["data"]["excludedSymbols"], serde_json::json!(["MRO", "ATVI"]));
}

#[tokio::test]
async fn test_analyze_portfolio_then_clear_cache() {
    let (app, engine) = test_app();
    let request = serde_json::json!({
        "sentimentSource": "memory",
        "startDate": "2021-01-01",
        "endDate": "2021-03-01",
        "topNStocks": 3
    });

    let (status, body) = call(app.clone(), Method::POST, "/portfolio/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["status"], "success");
    assert_eq!(data["portfolioComposition"]["2021-02-01"], serde_json::json!(["AAPL"]));
    assert_eq!(data["analysis"]["periodCount"], 1);
    assert_eq!(data["performanceData"]["dates"], serde_json::json!(["2021-02-01", "2021-02-02"]));
    assert_eq!(data["topStocks"][0]["symbol"], "AAPL");
    assert_eq!(data["metadata"]["requestParams"]["benchmarkTicker"], "QQQ");
    assert_eq!(engine.cache_len(), 1);

    let (status, body) = call(app, Method::DELETE, "/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);
    assert_eq!(engine.cache_len(), 0);
}

#[tokio::test]
async fn test_invalid_dates_are_bad_request() {
    let (app, _) = test_app();
    let request = serde_json::json!({ "startDate": "2023-01-01", "endDate": "2021-01-01" });
    let (status, body) = call(app, Method::POST, "/portfolio/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("start date"));
}

#[tokio::test]
async fn test_empty_composition_is_unprocessable() {
    let (app, _) = test_app();
    let request = serde_json::json!({ "sentimentSource": "quiet" });
    let (status, body) = call(app, Method::POST, "/portfolio/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("composition is empty"));
}

#[tokio::test]
async fn test_unreachable_sentiment_is_bad_gateway() {
    let (app, _) = test_app();
    let request = serde_json::json!({ "sentimentSource": "missing" });
    let (status, body) = call(app, Method::POST, "/portfolio/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_analyze_stocks() {
    let (app, _) = test_app();
    let request = serde_json::json!({ "symbols": ["msft", "DEAD"], "startDate": "2021-01-01", "endDate": "2021-03-01" });
    let (status, body) = call(app, Method::POST, "/stocks/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stocksAnalyzed"], 1);
    assert_eq!(body["data"]["metrics"]["MSFT"]["dataPoints"], 2);
    assert_eq!(body["data"]["period"], "2021-01-01 to 2021-03-01");
}

#[tokio::test]
async fn test_analyze_stocks_requires_symbols() {
    let (app, _) = test_app();
    let request = serde_json::json!({ "symbols": ["  "] });
    let (status, _) = call(app, Method::POST, "/stocks/analyze", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_app_error_status_mapping() {
    let cases = [
        (PipelineError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
        (PipelineError::EmptyComposition, StatusCode::UNPROCESSABLE_ENTITY),
        (PipelineError::DataSource("x".into()), StatusCode::BAD_GATEWAY),
        (PipelineError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
        assert_eq!(AppError::from(err).status_and_message().0, expected);
    }
}
