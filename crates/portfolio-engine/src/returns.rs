use portfolio_core::{PriceTable, ReturnSeries, TimeSeries};
use rayon::prelude::*;
use std::collections::BTreeSet;

use chrono::NaiveDate;

/// Daily log returns per symbol, `ln(p_t) - ln(p_{t-1})`.
///
/// Each symbol is differenced over its own consecutive observations, so its
/// returns never depend on which other symbols share the table. The first
/// observation of every symbol is dropped, and symbols with fewer than two
/// prices are omitted entirely. Non-positive prices have no logarithm and are
/// treated as missing.
pub fn compute_returns(prices: &PriceTable) -> ReturnSeries {
    let columns: Vec<(String, TimeSeries)> = prices
        .columns()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(symbol, series)| (symbol.clone(), series_returns(series)))
        .filter(|(_, series)| !series.is_empty())
        .collect();

    let mut returns = ReturnSeries::new();
    for (symbol, series) in columns {
        returns.insert(symbol, series);
    }
    returns
}

/// Log returns of a single series on its own dates.
pub fn series_returns(series: &TimeSeries) -> TimeSeries {
    let log_prices: Vec<(NaiveDate, f64)> = series
        .iter()
        .filter(|(_, p)| **p > 0.0 && p.is_finite())
        .map(|(date, p)| (*date, p.ln()))
        .collect();

    log_prices
        .windows(2)
        .map(|w| (w[1].0, w[1].1 - w[0].1))
        .collect()
}

/// Symbols that produced at least one return
pub fn valid_symbols(returns: &ReturnSeries) -> BTreeSet<String> {
    returns.columns().map(|(s, _)| s.clone()).collect()
}
