use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::PipelineError;

pub const DEFAULT_SENTIMENT_SOURCE: &str =
    "https://raw.githubusercontent.com/SalomeAc/Infraestructuras-proyecto/refs/heads/main/sentiment_data.csv";
pub const DEFAULT_START_DATE: &str = "2021-01-01";
pub const DEFAULT_END_DATE: &str = "2023-03-01";
pub const DEFAULT_TOP_N_STOCKS: usize = 5;
pub const DEFAULT_BENCHMARK_TICKER: &str = "QQQ";

fn default_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

/// Portfolio analysis request as received from a shell; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRequest {
    #[serde(default, alias = "sentimentUrl", alias = "sentiment_url")]
    pub sentiment_source: Option<String>,
    #[serde(default, alias = "start_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "end_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, alias = "top_n_stocks")]
    pub top_n_stocks: Option<usize>,
    #[serde(default, alias = "benchmark_ticker")]
    pub benchmark_ticker: Option<String>,
}

impl PortfolioRequest {
    /// Resolve every optional field to its default.
    pub fn normalize(&self) -> NormalizedPortfolioRequest {
        NormalizedPortfolioRequest {
            sentiment_source: self
                .sentiment_source
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SENTIMENT_SOURCE)
                .to_string(),
            start_date: self.start_date.unwrap_or_else(|| default_date(DEFAULT_START_DATE)),
            end_date: self.end_date.unwrap_or_else(|| default_date(DEFAULT_END_DATE)),
            top_n_stocks: self.top_n_stocks.unwrap_or(DEFAULT_TOP_N_STOCKS),
            benchmark_ticker: self
                .benchmark_ticker
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_BENCHMARK_TICKER)
                .to_uppercase(),
        }
    }
}

/// Fully resolved portfolio request; the cache key is derived from this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPortfolioRequest {
    pub sentiment_source: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub top_n_stocks: usize,
    pub benchmark_ticker: String,
}

impl NormalizedPortfolioRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.start_date >= self.end_date {
            return Err(PipelineError::InvalidRequest(format!(
                "start date {} must be before end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.top_n_stocks == 0 {
            return Err(PipelineError::InvalidRequest(
                "topNStocks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable SHA-256 over every resolved field, in a fixed order.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sentiment_source.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.start_date.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.end_date.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update((self.top_n_stocks as u64).to_le_bytes());
        hasher.update([0u8]);
        hasher.update(self.benchmark_ticker.as_bytes());
        format!("portfolio_{}", hex::encode(hasher.finalize()))
    }
}

/// Per-symbol analysis request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAnalysisRequest {
    pub symbols: Vec<String>,
    #[serde(default, alias = "start_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "end_date")]
    pub end_date: Option<NaiveDate>,
}

impl StockAnalysisRequest {
    /// Uppercase, trim and de-duplicate symbols (first occurrence wins) and
    /// resolve the date defaults.
    pub fn normalize(&self) -> Result<NormalizedStockRequest, PipelineError> {
        let mut symbols: Vec<String> = Vec::with_capacity(self.symbols.len());
        for raw in &self.symbols {
            let symbol = raw.trim().to_uppercase();
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if symbols.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "at least one symbol is required".to_string(),
            ));
        }

        let start_date = self.start_date.unwrap_or_else(|| default_date(DEFAULT_START_DATE));
        let end_date = self.end_date.unwrap_or_else(|| default_date(DEFAULT_END_DATE));
        if start_date >= end_date {
            return Err(PipelineError::InvalidRequest(format!(
                "start date {} must be before end date {}",
                start_date, end_date
            )));
        }

        Ok(NormalizedStockRequest {
            symbols,
            start_date,
            end_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedStockRequest {
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
