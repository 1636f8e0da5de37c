use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use futures_util::future::join_all;
use portfolio_core::{PipelineError, PriceField, PriceHistorySource, PricePoint};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) sentiment-portfolio/0.1";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let oldest = ts.front().copied().unwrap_or(now);
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for a price API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Daily price history from the Yahoo Finance chart endpoint.
#[derive(Clone)]
pub struct YahooClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl YahooClient {
    pub fn new() -> Self {
        // Requests per minute; the public endpoint starts refusing bursts well below 200/min
        let rate_limit: usize = std::env::var("PRICE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        let timeout_secs: u64 = std::env::var("PRICE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, PipelineError> {
        let request = builder
            .build()
            .map_err(|e| PipelineError::DataSource(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| PipelineError::DataSource("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| PipelineError::DataSource(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 5u64 * (attempt as u64 + 1);
            tracing::warn!("Price API 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(PipelineError::DataSource("Rate limited by price API after 3 retries".to_string()))
    }

    /// Daily bars for one symbol in `[start, end)` as typed price points.
    pub async fn get_daily_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, PipelineError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, chart_symbol(symbol));

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("period1", unix_midnight(start).to_string()),
                ("period2", unix_midnight(end).to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,split".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::DataSource(format!(
                "{}: HTTP {}: {}",
                symbol,
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::DataSource(format!("{}: {}", symbol, e)))?;

        parse_chart(symbol, chart)
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceHistorySource for YahooClient {
    /// Symbols are requested concurrently (the rate limiter spaces them out).
    /// Individual symbol failures are dropped; only a batch where every
    /// symbol failed is reported as an error.
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, PipelineError> {
        let results = join_all(
            symbols
                .iter()
                .map(|symbol| self.get_daily_history(symbol, start, end)),
        )
        .await;

        let mut points = Vec::new();
        let mut failures = Vec::new();
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(mut rows) => points.append(&mut rows),
                Err(e) => {
                    tracing::warn!("Price history for {} unavailable: {}", symbol, e);
                    failures.push(e);
                }
            }
        }

        if !symbols.is_empty() && failures.len() == symbols.len() {
            let first = failures
                .into_iter()
                .next()
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(PipelineError::DataSource(format!(
                "all {} symbols failed (first error: {})",
                symbols.len(),
                first
            )));
        }

        Ok(points)
    }
}

/// Share-class separators use a dash on this endpoint (`BRK.B` -> `BRK-B`).
fn chart_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Flatten a chart response into `{symbol, field, date, value}` rows,
/// skipping null cells.
fn parse_chart(symbol: &str, chart: ChartResponse) -> Result<Vec<PricePoint>, PipelineError> {
    if let Some(err) = chart.chart.error {
        return Err(PipelineError::DataSource(format!(
            "{}: {} ({})",
            symbol, err.description, err.code
        )));
    }

    let Some(result) = chart.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let dates: Vec<Option<NaiveDate>> = result
        .timestamp
        .iter()
        .map(|t| DateTime::from_timestamp(*t, 0).map(|dt| dt.date_naive()))
        .collect();

    let mut columns: Vec<(PriceField, Vec<Option<f64>>)> = Vec::new();
    if let Some(quote) = result.indicators.quote.into_iter().next() {
        columns.push((PriceField::Open, quote.open));
        columns.push((PriceField::High, quote.high));
        columns.push((PriceField::Low, quote.low));
        columns.push((PriceField::Close, quote.close));
        columns.push((PriceField::Volume, quote.volume));
    }
    if let Some(adj) = result.indicators.adjclose.into_iter().next() {
        columns.push((PriceField::AdjClose, adj.adjclose));
    }

    let mut points = Vec::with_capacity(dates.len() * columns.len());
    for (field, values) in columns {
        for (date, value) in dates.iter().zip(values) {
            if let (Some(date), Some(value)) = (date, value) {
                points.push(PricePoint::new(symbol, field, *date, value));
            }
        }
    }
    Ok(points)
}

// Response structures
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
