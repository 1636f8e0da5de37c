use portfolio_core::{PerformanceMetrics, StockMetrics, TimeSeries};
use statrs::statistics::Statistics;

pub const TRADING_DAYS: f64 = 252.0;

/// `exp(cumsum(ln(1 + r))) - 1`, i.e. compounded simple returns.
pub fn cumulative_returns(returns: &TimeSeries) -> TimeSeries {
    let mut log_sum = 0.0;
    returns
        .iter()
        .map(|(date, r)| {
            log_sum += r.ln_1p();
            (*date, log_sum.exp() - 1.0)
        })
        .collect()
}

/// Last value of a cumulative series, 0 when empty.
pub fn total_return(cumulative: &TimeSeries) -> f64 {
    cumulative.values().next_back().copied().unwrap_or(0.0)
}

/// Sample standard deviation scaled by `sqrt(252)`; 0 for fewer than two
/// observations or a constant series.
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    if returns.len() < 2 || returns.iter().all(|r| *r == returns[0]) {
        return 0.0;
    }
    let vol = returns.std_dev() * TRADING_DAYS.sqrt();
    if vol.is_finite() {
        vol
    } else {
        0.0
    }
}

/// Annualized mean over annualized volatility; 0 when volatility is 0.
pub fn sharpe_ratio(returns: &[f64], volatility: f64) -> f64 {
    if returns.is_empty() || volatility == 0.0 || !volatility.is_finite() {
        return 0.0;
    }
    let sharpe = returns.mean() * TRADING_DAYS / volatility;
    if sharpe.is_finite() {
        sharpe
    } else {
        0.0
    }
}

/// Metrics for one symbol from its daily log returns.
pub fn stock_metrics(log_returns: &TimeSeries) -> StockMetrics {
    let values: Vec<f64> = log_returns.values().copied().filter(|r| r.is_finite()).collect();
    let volatility = annualized_volatility(&values);
    StockMetrics {
        total_return: values.iter().sum::<f64>().exp() - 1.0,
        volatility,
        sharpe_ratio: sharpe_ratio(&values, volatility),
        data_points: values.len(),
    }
}

/// Portfolio and benchmark statistics over the portfolio's dates.
#[derive(Debug, Clone, Default)]
pub struct PerformanceReport {
    pub portfolio_cumulative: TimeSeries,
    pub benchmark_cumulative: TimeSeries,
    pub total_portfolio_return: f64,
    pub total_benchmark_return: f64,
    pub portfolio_volatility: f64,
    pub benchmark_volatility: f64,
    pub sharpe_ratio: f64,
}

impl PerformanceReport {
    pub fn metrics(&self, period_count: usize, unique_symbol_count: usize) -> PerformanceMetrics {
        PerformanceMetrics {
            total_portfolio_return: self.total_portfolio_return,
            total_benchmark_return: self.total_benchmark_return,
            excess_return: self.total_portfolio_return - self.total_benchmark_return,
            portfolio_volatility: self.portfolio_volatility,
            benchmark_volatility: self.benchmark_volatility,
            sharpe_ratio: self.sharpe_ratio,
            period_count,
            unique_symbol_count,
        }
    }
}

pub struct PerformanceAnalyzer;

impl PerformanceAnalyzer {
    /// The benchmark is left-joined onto the portfolio's dates. Each series
    /// then drops its own missing or non-finite rows, so the two cumulative
    /// curves may cover different date sets.
    pub fn compute_metrics(portfolio: &TimeSeries, benchmark: &TimeSeries) -> PerformanceReport {
        let portfolio: TimeSeries = portfolio
            .iter()
            .filter(|(_, r)| r.is_finite())
            .map(|(d, r)| (*d, *r))
            .collect();
        let benchmark: TimeSeries = portfolio
            .keys()
            .filter_map(|d| benchmark.get(d).filter(|r| r.is_finite()).map(|r| (*d, *r)))
            .collect();

        let portfolio_values: Vec<f64> = portfolio.values().copied().collect();
        let benchmark_values: Vec<f64> = benchmark.values().copied().collect();

        let portfolio_cumulative = cumulative_returns(&portfolio);
        let benchmark_cumulative = cumulative_returns(&benchmark);
        let portfolio_volatility = annualized_volatility(&portfolio_values);

        PerformanceReport {
            total_portfolio_return: total_return(&portfolio_cumulative),
            total_benchmark_return: total_return(&benchmark_cumulative),
            portfolio_volatility,
            benchmark_volatility: annualized_volatility(&benchmark_values),
            sharpe_ratio: sharpe_ratio(&portfolio_values, portfolio_volatility),
            portfolio_cumulative,
            benchmark_cumulative,
        }
    }
}
