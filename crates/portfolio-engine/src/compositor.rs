use chrono::NaiveDate;
use portfolio_core::calendar::roll_to_month_end;
use portfolio_core::{PortfolioComposition, ReturnSeries, TimeSeries};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Equal-weighted portfolio return over the monthly rebalance windows.
#[derive(Debug, Clone)]
pub struct PortfolioReturnCompositor {
    batch_size: usize,
}

impl PortfolioReturnCompositor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Holding-start dates are split into batches processed on the rayon
    /// pool. Batches may finish in any order; the merged series is keyed by
    /// date so the result is always chronological.
    pub fn compose(&self, returns: &ReturnSeries, composition: &PortfolioComposition) -> TimeSeries {
        let index: BTreeSet<NaiveDate> = returns
            .columns()
            .flat_map(|(_, series)| series.keys().copied())
            .collect();
        let periods: Vec<(&NaiveDate, &Vec<String>)> = composition.iter().collect();

        let partials: Vec<TimeSeries> = periods
            .par_chunks(self.batch_size)
            .map(|batch| {
                let mut rows = TimeSeries::new();
                for (start, symbols) in batch {
                    rows.extend(window_returns(returns, &index, **start, symbols));
                }
                rows
            })
            .collect();

        let mut portfolio = TimeSeries::new();
        for rows in partials {
            portfolio.extend(rows);
        }

        tracing::info!(
            "Composed {} portfolio return rows from {} holding periods in batches of {}",
            portfolio.len(),
            periods.len(),
            self.batch_size
        );
        portfolio
    }
}

impl Default for PortfolioReturnCompositor {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Mean return of the held symbols on every index date of
/// `[start, roll_to_month_end(start)]`. Held symbols missing from `returns`
/// are left out of the average; a date where no held symbol has a return
/// yields no row.
fn window_returns(
    returns: &ReturnSeries,
    index: &BTreeSet<NaiveDate>,
    start: NaiveDate,
    symbols: &[String],
) -> TimeSeries {
    let held: Vec<&TimeSeries> = symbols.iter().filter_map(|s| returns.column(s)).collect();
    if held.is_empty() {
        tracing::debug!("Holding period {} has no symbols with returns", start);
        return TimeSeries::new();
    }

    let end = roll_to_month_end(start);
    index
        .range(start..=end)
        .filter_map(|date| {
            let (sum, count) = held
                .iter()
                .filter_map(|series| series.get(date))
                .filter(|r| r.is_finite())
                .fold((0.0, 0usize), |(sum, n), r| (sum + r, n + 1));
            (count > 0).then(|| (*date, sum / count as f64))
        })
        .collect()
}
