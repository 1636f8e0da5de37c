//! Response payloads handed to the transport shells.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{NormalizedPortfolioRequest, PerformanceMetrics, PortfolioComposition, TimeSeries};

/// Dates and values as parallel sequences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatedValues {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl From<&TimeSeries> for DatedValues {
    fn from(series: &TimeSeries) -> Self {
        let (dates, values) = series.iter().map(|(d, v)| (*d, *v)).unzip();
        Self { dates, values }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceData {
    pub dates: Vec<NaiveDate>,
    pub portfolio_cumulative_returns: Vec<f64>,
    pub benchmark_dates: Vec<NaiveDate>,
    pub benchmark_cumulative_returns: Vec<f64>,
}

impl PerformanceData {
    pub fn new(portfolio: DatedValues, benchmark: DatedValues) -> Self {
        Self {
            dates: portfolio.dates,
            portfolio_cumulative_returns: portfolio.values,
            benchmark_dates: benchmark.dates,
            benchmark_cumulative_returns: benchmark.values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopStock {
    pub symbol: String,
    pub months: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub request_params: NormalizedPortfolioRequest,
    pub cache_key: String,
    pub timestamp: DateTime<Utc>,
}

/// Complete portfolio analysis; this is the value memoized by the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioAnalysis {
    pub status: String,
    pub processing_time_seconds: f64,
    pub analysis: PerformanceMetrics,
    pub performance_data: PerformanceData,
    pub portfolio_composition: PortfolioComposition,
    pub top_stocks: Vec<TopStock>,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMetrics {
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAnalysis {
    pub status: String,
    pub stocks_analyzed: usize,
    pub metrics: BTreeMap<String, StockMetrics>,
    pub period: String,
    pub timestamp: DateTime<Utc>,
}
