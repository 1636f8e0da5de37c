use chrono::Utc;
use portfolio_core::{
    AnalysisMetadata, DatedValues, NormalizedPortfolioRequest, PerformanceData, PipelineError,
    PortfolioAnalysis, PortfolioRequest, PriceHistorySource, SentimentSource, StockAnalysis,
    StockAnalysisRequest, TopStock,
};
use sentiment_analysis::SentimentAggregator;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub mod cache;
pub mod compositor;
pub mod config;
pub mod fetcher;
pub mod performance;
pub mod returns;

pub use cache::ResultCache;
pub use compositor::PortfolioReturnCompositor;
pub use config::EngineConfig;
pub use fetcher::BatchedDataFetcher;
pub use performance::{PerformanceAnalyzer, PerformanceReport};
pub use returns::compute_returns;


/// Number of most frequently held symbols reported with every analysis
const TOP_STOCKS_REPORTED: usize = 10;

/// Runs the sentiment portfolio pipeline and memoizes complete results.
///
/// One engine is shared by every request of a process; the result cache is
/// its only mutable state.
pub struct PortfolioEngine {
    config: EngineConfig,
    fetcher: BatchedDataFetcher,
    compositor: PortfolioReturnCompositor,
    sentiment_source: Arc<dyn SentimentSource>,
    cache: ResultCache<PortfolioAnalysis>,
}

impl PortfolioEngine {
    pub fn new(
        config: EngineConfig,
        price_source: Arc<dyn PriceHistorySource>,
        sentiment_source: Arc<dyn SentimentSource>,
    ) -> Self {
        Self {
            fetcher: BatchedDataFetcher::new(price_source, &config),
            compositor: PortfolioReturnCompositor::new(config.rebalance_batch_size),
            sentiment_source,
            cache: ResultCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full analysis for `request`, served from cache when the normalized
    /// request was computed before. Concurrent identical requests share one
    /// computation.
    pub async fn analyze_portfolio(
        &self,
        request: &PortfolioRequest,
    ) -> Result<Arc<PortfolioAnalysis>, PipelineError> {
        let params = request.normalize();
        params.validate()?;
        let key = params.cache_key();

        let (analysis, computed) = self
            .cache
            .get_or_try_compute(&key, || self.run_portfolio(params, key.clone()))
            .await?;

        if computed {
            tracing::info!("Cached portfolio analysis {}", key);
        } else {
            tracing::info!("Cache hit for {}", key);
        }
        Ok(analysis)
    }

    async fn run_portfolio(
        &self,
        params: NormalizedPortfolioRequest,
        cache_key: String,
    ) -> Result<PortfolioAnalysis, PipelineError> {
        let started = Instant::now();
        tracing::info!(
            "Starting portfolio analysis {} to {} (top {}, benchmark {})",
            params.start_date,
            params.end_date,
            params.top_n_stocks,
            params.benchmark_ticker
        );

        let composition = SentimentAggregator::build_composition(
            self.sentiment_source.as_ref(),
            &params.sentiment_source,
            params.top_n_stocks,
        )
        .await?;
        if composition.is_empty() {
            return Err(PipelineError::EmptyComposition);
        }

        let symbols: Vec<String> = composition.unique_symbols().into_iter().collect();
        tracing::info!(
            "Composition has {} holding periods over {} unique symbols",
            composition.len(),
            symbols.len()
        );

        let stage = Instant::now();
        let benchmark_symbols = [params.benchmark_ticker.clone()];
        let (prices, benchmark_prices) = tokio::join!(
            self.fetcher.fetch_prices(&symbols, params.start_date, params.end_date),
            self.fetcher.fetch_prices(&benchmark_symbols, params.start_date, params.end_date),
        );
        if prices.is_empty() {
            return Err(PipelineError::DataSource(format!(
                "no price data available for any of {} symbols",
                symbols.len()
            )));
        }
        tracing::info!("Price stage finished in {:.2}s", stage.elapsed().as_secs_f64());

        let stage = Instant::now();
        let compositor = self.compositor.clone();
        let composition_for_worker = composition.clone();
        let benchmark_ticker = params.benchmark_ticker.clone();
        let (portfolio_returns, benchmark_returns) = tokio::task::spawn_blocking(move || {
            let symbol_returns = compute_returns(&prices);
            tracing::info!("Computed returns for {}/{} symbols", symbol_returns.len(), prices.len());
            let portfolio = compositor.compose(&symbol_returns, &composition_for_worker);
            let benchmark = benchmark_prices
                .column(&benchmark_ticker)
                .map(returns::series_returns)
                .unwrap_or_default();
            (portfolio, benchmark)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("return worker failed: {}", e)))?;
        tracing::info!("Return stage finished in {:.2}s", stage.elapsed().as_secs_f64());

        if benchmark_returns.is_empty() {
            tracing::warn!("No benchmark returns for {}; benchmark metrics default to 0", params.benchmark_ticker);
        }

        let report = PerformanceAnalyzer::compute_metrics(&portfolio_returns, &benchmark_returns);
        let metrics = report.metrics(composition.len(), symbols.len());
        let top_stocks = composition
            .holding_frequency()
            .into_iter()
            .take(TOP_STOCKS_REPORTED)
            .map(|(symbol, months)| TopStock { symbol, months })
            .collect();

        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!(
            "Portfolio analysis finished in {:.2}s: return {:.4}, benchmark {:.4}, sharpe {:.3}",
            elapsed,
            metrics.total_portfolio_return,
            metrics.total_benchmark_return,
            metrics.sharpe_ratio
        );

        Ok(PortfolioAnalysis {
            status: "success".to_string(),
            processing_time_seconds: elapsed,
            analysis: metrics,
            performance_data: PerformanceData::new(
                DatedValues::from(&report.portfolio_cumulative),
                DatedValues::from(&report.benchmark_cumulative),
            ),
            portfolio_composition: composition,
            top_stocks,
            metadata: AnalysisMetadata {
                request_params: params,
                cache_key,
                timestamp: Utc::now(),
            },
        })
    }

    /// Per-symbol return statistics over the requested period. Not cached.
    pub async fn analyze_stocks(&self, request: &StockAnalysisRequest) -> Result<StockAnalysis, PipelineError> {
        let params = request.normalize()?;
        tracing::info!(
            "Analyzing {} stocks from {} to {}",
            params.symbols.len(),
            params.start_date,
            params.end_date
        );

        let prices = self
            .fetcher
            .fetch_prices(&params.symbols, params.start_date, params.end_date)
            .await;
        if prices.is_empty() {
            return Err(PipelineError::DataSource(format!(
                "no price data available for {}",
                params.symbols.join(", ")
            )));
        }

        let metrics = tokio::task::spawn_blocking(move || {
            compute_returns(&prices)
                .columns()
                .map(|(symbol, series)| (symbol.clone(), performance::stock_metrics(series)))
                .collect::<BTreeMap<_, _>>()
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("stock metrics worker failed: {}", e)))?;

        Ok(StockAnalysis {
            status: "success".to_string(),
            stocks_analyzed: metrics.len(),
            metrics,
            period: format!("{} to {}", params.start_date, params.end_date),
            timestamp: Utc::now(),
        })
    }

    /// Drop every cached analysis; returns how many were removed.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!("Cleared {} cached analyses", removed);
        removed
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cached(&self, cache_key: &str) -> Option<Arc<PortfolioAnalysis>> {
        self.cache.get(cache_key)
    }
}
