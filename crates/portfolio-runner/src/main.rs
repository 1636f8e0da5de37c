//! portfolio-runner: run the sentiment portfolio pipeline in-process.
//!
//! Usage:
//!   cargo run -p portfolio-runner
//!   cargo run -p portfolio-runner -- --top-n 10 --benchmark SPY --start 2022-01-01
//!   cargo run -p portfolio-runner -- --sentiment-source ./sentiment_data.csv
//!   cargo run -p portfolio-runner -- --symbols AAPL MSFT NVDA

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use portfolio_core::{PortfolioAnalysis, PortfolioRequest, StockAnalysis, StockAnalysisRequest};
use portfolio_engine::{EngineConfig, PortfolioEngine};
use price_client::YahooClient;
use sentiment_analysis::CsvSentimentSource;
use std::path::PathBuf;
use std::sync::Arc;

/// Compositions shown at the end of the summary
const RECENT_COMPOSITIONS: usize = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sentiment-driven monthly portfolio analysis", long_about = None)]
struct Cli {
    /// Sentiment CSV (http(s) URL or local path)
    #[arg(long)]
    sentiment_source: Option<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Symbols held per month
    #[arg(long)]
    top_n: Option<usize>,

    /// Benchmark ticker
    #[arg(long)]
    benchmark: Option<String>,

    /// Where to write the full JSON result
    #[arg(short, long, default_value = "portfolio_results.json")]
    output: PathBuf,

    /// Analyze these symbols individually instead of building a portfolio
    #[arg(long, num_args = 1..)]
    symbols: Vec<String>,
}

impl Cli {
    fn portfolio_request(&self) -> PortfolioRequest {
        PortfolioRequest {
            sentiment_source: self.sentiment_source.clone(),
            start_date: self.start,
            end_date: self.end,
            top_n_stocks: self.top_n,
            benchmark_ticker: self.benchmark.clone(),
        }
    }

    fn stock_request(&self) -> StockAnalysisRequest {
        StockAnalysisRequest {
            symbols: self.symbols.clone(),
            start_date: self.start,
            end_date: self.end,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_runner=info,portfolio_engine=info,sentiment_analysis=info,price_client=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    tracing::info!(
        "Engine config: batch size {}, {} workers, rebalance batch {}",
        config.fetch_batch_size,
        config.fetch_max_workers,
        config.rebalance_batch_size
    );
    let engine = PortfolioEngine::new(
        config,
        Arc::new(YahooClient::new()),
        Arc::new(CsvSentimentSource::new()),
    );

    let json = if cli.symbols.is_empty() {
        let analysis = engine
            .analyze_portfolio(&cli.portfolio_request())
            .await
            .context("portfolio analysis failed")?;
        print!("{}", portfolio_summary(&analysis));
        serde_json::to_string_pretty(analysis.as_ref())?
    } else {
        let analysis = engine
            .analyze_stocks(&cli.stock_request())
            .await
            .context("stock analysis failed")?;
        print!("{}", stock_summary(&analysis));
        serde_json::to_string_pretty(&analysis)?
    };

    tokio::fs::write(&cli.output, json)
        .await
        .with_context(|| format!("cannot write {}", cli.output.display()))?;
    println!("\nFull results written to {}", cli.output.display());
    Ok(())
}

fn pct(value: f64) -> String {
    format!("{:>9.2}%", value * 100.0)
}

fn portfolio_summary(analysis: &PortfolioAnalysis) -> String {
    let m = &analysis.analysis;
    let params = &analysis.metadata.request_params;
    let mut out = String::new();

    out.push_str(&format!(
        "\n=== Sentiment portfolio {} to {} (top {} vs {}) ===\n",
        params.start_date, params.end_date, params.top_n_stocks, params.benchmark_ticker
    ));
    out.push_str(&format!("  Portfolio return     {}\n", pct(m.total_portfolio_return)));
    out.push_str(&format!("  Benchmark return     {}\n", pct(m.total_benchmark_return)));
    out.push_str(&format!("  Excess return        {}\n", pct(m.excess_return)));
    out.push_str(&format!("  Portfolio volatility {}\n", pct(m.portfolio_volatility)));
    out.push_str(&format!("  Benchmark volatility {}\n", pct(m.benchmark_volatility)));
    out.push_str(&format!("  Sharpe ratio         {:>10.3}\n", m.sharpe_ratio));
    out.push_str(&format!("  Holding periods      {:>10}\n", m.period_count));
    out.push_str(&format!("  Unique symbols       {:>10}\n", m.unique_symbol_count));
    out.push_str(&format!("  Processing time      {:>9.2}s\n", analysis.processing_time_seconds));

    out.push_str("\nMost frequently held:\n");
    for (i, stock) in analysis.top_stocks.iter().enumerate() {
        out.push_str(&format!("  {:>2}. {:<8} {} months\n", i + 1, stock.symbol, stock.months));
    }

    out.push_str("\nRecent compositions:\n");
    let periods: Vec<_> = analysis.portfolio_composition.iter().collect();
    let skip = periods.len().saturating_sub(RECENT_COMPOSITIONS);
    for (start, symbols) in &periods[skip..] {
        out.push_str(&format!("  {}  {}\n", start, symbols.join(", ")));
    }
    out
}

fn stock_summary(analysis: &StockAnalysis) -> String {
    let mut out = format!(
        "\n=== {} stocks, {} ===\n  {:<8} {:>10} {:>10} {:>8} {:>6}\n",
        analysis.stocks_analyzed, analysis.period, "Symbol", "Return", "Vol", "Sharpe", "Days"
    );
    for (symbol, m) in &analysis.metrics {
        out.push_str(&format!(
            "  {:<8} {} {} {:>8.3} {:>6}\n",
            symbol,
            pct(m.total_return),
            pct(m.volatility),
            m.sharpe_ratio,
            m.data_points
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portfolio_core::{
        AnalysisMetadata, PerformanceData, PerformanceMetrics, PortfolioComposition, StockMetrics,
        TopStock,
    };
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_defaults_leave_request_fields_unset() {
        let cli = Cli::try_parse_from(["portfolio-runner"]).unwrap();
        assert_eq!(cli.portfolio_request(), PortfolioRequest::default());
        assert_eq!(cli.output, PathBuf::from("portfolio_results.json"));
        assert!(cli.symbols.is_empty());
    }

    #[test]
    fn test_flags_map_onto_request() {
        let cli = Cli::try_parse_from([
            "portfolio-runner",
            "--start", "2022-01-01",
            "--end", "2022-12-31",
            "--top-n", "3",
            "--benchmark", "SPY",
            "--sentiment-source", "data.csv",
        ])
        .unwrap();
        let normalized = cli.portfolio_request().normalize();
        assert_eq!(normalized.start_date, d(2022, 1, 1));
        assert_eq!(normalized.end_date, d(2022, 12, 31));
        assert_eq!(normalized.top_n_stocks, 3);
        assert_eq!(normalized.benchmark_ticker, "SPY");
        assert_eq!(normalized.sentiment_source, "data.csv");
    }

    #[test]
    fn test_symbols_switch_to_stock_analysis() {
        let cli = Cli::try_parse_from(["portfolio-runner", "--symbols", "aapl", "MSFT", "-o", "out.json"]).unwrap();
        assert_eq!(cli.stock_request().symbols, vec!["aapl", "MSFT"]);
        assert_eq!(cli.output, PathBuf::from("out.json"));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["portfolio-runner", "--start", "01/02/2021"]).is_err());
    }

    #[test]
    fn test_portfolio_summary_shows_last_five_compositions() {
        let composition: PortfolioComposition = (1..=7u32)
            .map(|m| (d(2021, m, 1), vec![format!("S{}", m)]))
            .collect();
        let analysis = PortfolioAnalysis {
            status: "success".into(),
            processing_time_seconds: 1.5,
            analysis: PerformanceMetrics {
                total_portfolio_return: 0.25,
                period_count: 7,
                ..Default::default()
            },
            performance_data: PerformanceData::default(),
            portfolio_composition: composition,
            top_stocks: vec![TopStock { symbol: "S1".into(), months: 1 }],
            metadata: AnalysisMetadata {
                request_params: PortfolioRequest::default().normalize(),
                cache_key: "portfolio_x".into(),
                timestamp: Utc::now(),
            },
        };

        let text = portfolio_summary(&analysis);
        assert!(text.contains("25.00%"));
        assert!(text.contains("S1       1 months"));
        assert!(!text.contains("2021-02-01"));
        assert!(text.contains("2021-03-01  S3"));
        assert!(text.contains("2021-07-01  S7"));
    }

    #[test]
    fn test_stock_summary_lists_every_symbol() {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "AAPL".to_string(),
            StockMetrics { total_return: 0.1, volatility: 0.2, sharpe_ratio: 0.5, data_points: 20 },
        );
        let analysis = StockAnalysis {
            status: "success".into(),
            stocks_analyzed: 1,
            metrics,
            period: "2021-01-01 to 2021-02-01".into(),
            timestamp: Utc::now(),
        };
        let text = stock_summary(&analysis);
        assert!(text.contains("AAPL"));
        assert!(text.contains("10.00%"));
    }
}
