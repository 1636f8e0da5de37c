use chrono::NaiveDate;
use portfolio_core::calendar::{month_end, next_period_start};
use portfolio_core::{
    EngagementRecord, MonthlyScore, PipelineError, PortfolioComposition, SentimentSource,
};
use std::collections::BTreeMap;
use std::time::Instant;

/// Turns raw engagement records into a rebalance schedule.
///
/// The steps share intermediate tables and must run in order:
/// [`load_records`](Self::load_records) -> [`aggregate`](Self::aggregate) ->
/// [`filter_top`](Self::filter_top) -> [`composition`](Self::composition).
/// Each step reads what the previous one left behind; calling a step early
/// simply sees empty tables.
#[derive(Debug, Default)]
pub struct SentimentAggregator {
    records: Vec<EngagementRecord>,
    scores: Vec<MonthlyScore>,
    selected: Vec<MonthlyScore>,
}

impl SentimentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only records with enough engagement to carry a signal.
    /// Returns how many records survived.
    pub fn load_records(&mut self, records: Vec<EngagementRecord>) -> usize {
        let total = records.len();
        self.records = records.into_iter().filter(EngagementRecord::qualifies).collect();
        self.scores.clear();
        self.selected.clear();
        tracing::info!(
            "Sentiment filter kept {}/{} records (likes > 20, comments > 10)",
            self.records.len(),
            total
        );
        self.records.len()
    }

    /// Average engagement ratio per (calendar month, symbol), then rank within
    /// each month: highest ratio first, ties broken by symbol.
    pub fn aggregate(&mut self) -> &[MonthlyScore] {
        let mut sums: BTreeMap<(NaiveDate, &str), (f64, usize)> = BTreeMap::new();
        for record in &self.records {
            let entry = sums
                .entry((month_end(record.date), record.symbol.as_str()))
                .or_insert((0.0, 0));
            entry.0 += record.engagement_ratio();
            entry.1 += 1;
        }

        let mut by_month: BTreeMap<NaiveDate, Vec<(String, f64)>> = BTreeMap::new();
        for ((month, symbol), (sum, count)) in sums {
            by_month
                .entry(month)
                .or_default()
                .push((symbol.to_string(), sum / count as f64));
        }

        self.scores.clear();
        for (month, mut rows) in by_month {
            rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            self.scores.extend(rows.into_iter().enumerate().map(|(i, (symbol, ratio))| {
                MonthlyScore {
                    month_end: month,
                    symbol,
                    mean_engagement_ratio: ratio,
                    rank: i + 1,
                }
            }));
        }

        tracing::info!("Aggregated {} monthly scores", self.scores.len());
        &self.scores
    }

    /// Keep the `top_n` best-ranked symbols of every month.
    pub fn filter_top(&mut self, top_n: usize) -> usize {
        self.selected = self
            .scores
            .iter()
            .filter(|s| s.rank <= top_n)
            .cloned()
            .collect();
        tracing::info!("Selected {} (month, symbol) pairs with top {}", self.selected.len(), top_n);
        self.selected.len()
    }

    /// Group the selection by holding-start date: the signal of month M is
    /// traded from the first day after M's end.
    pub fn composition(&self) -> PortfolioComposition {
        let mut grouped: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for score in &self.selected {
            grouped
                .entry(next_period_start(score.month_end))
                .or_default()
                .push(score.symbol.clone());
        }
        grouped.into_iter().collect()
    }

    pub fn scores(&self) -> &[MonthlyScore] {
        &self.scores
    }

    /// Load from `source` and run every step on a blocking worker thread.
    pub async fn build_composition(
        source: &dyn SentimentSource,
        location: &str,
        top_n: usize,
    ) -> Result<PortfolioComposition, PipelineError> {
        let started = Instant::now();
        let records = source.load(location).await?;

        let composition = tokio::task::spawn_blocking(move || {
            let mut aggregator = SentimentAggregator::new();
            aggregator.load_records(records);
            aggregator.aggregate();
            aggregator.filter_top(top_n);
            aggregator.composition()
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("sentiment worker failed: {}", e)))?;

        tracing::info!(
            "Sentiment processing finished in {:.2}s: {} holding periods",
            started.elapsed().as_secs_f64(),
            composition.len()
        );
        Ok(composition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(date: NaiveDate, symbol: &str, likes: f64, comments: f64) -> EngagementRecord {
        EngagementRecord {
            date,
            symbol: symbol.to_string(),
            like_count: likes,
            comment_count: comments,
        }
    }

    struct StaticSource(Vec<EngagementRecord>);

    #[async_trait]
    impl SentimentSource for StaticSource {
        async fn load(&self, _location: &str) -> Result<Vec<EngagementRecord>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_sub_threshold_records_are_dropped() {
        let mut agg = SentimentAggregator::new();
        let kept = agg.load_records(vec![
            rec(d(2021, 1, 4), "A", 100.0, 30.0),
            rec(d(2021, 1, 4), "B", 20.0, 30.0),
            rec(d(2021, 1, 4), "C", 100.0, 10.0),
        ]);
        assert_eq!(kept, 1);
        let scores = agg.aggregate();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].symbol, "A");
    }

    #[test]
    fn test_monthly_mean_and_rank() {
        let mut agg = SentimentAggregator::new();
        agg.load_records(vec![
            rec(d(2021, 1, 4), "A", 100.0, 20.0),
            rec(d(2021, 1, 20), "A", 100.0, 40.0),
            rec(d(2021, 1, 5), "B", 100.0, 50.0),
            rec(d(2021, 2, 3), "A", 100.0, 90.0),
        ]);
        let scores = agg.aggregate().to_vec();

        let jan: Vec<&MonthlyScore> = scores.iter().filter(|s| s.month_end == d(2021, 1, 31)).collect();
        assert_eq!(jan.len(), 2);
        assert_eq!(jan[0].symbol, "B");
        assert_eq!(jan[0].rank, 1);
        assert_eq!(jan[1].symbol, "A");
        assert!((jan[1].mean_engagement_ratio - 0.3).abs() < 1e-12);
        assert_eq!(jan[1].rank, 2);

        // Ranks restart every month
        let feb: Vec<&MonthlyScore> = scores.iter().filter(|s| s.month_end == d(2021, 2, 28)).collect();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].rank, 1);
    }

    #[test]
    fn test_ties_break_by_symbol() {
        let mut agg = SentimentAggregator::new();
        agg.load_records(vec![
            rec(d(2021, 1, 4), "ZZ", 100.0, 30.0),
            rec(d(2021, 1, 4), "AA", 50.0, 15.0),
        ]);
        let scores = agg.aggregate();
        assert_eq!(scores[0].symbol, "AA");
        assert_eq!(scores[0].rank, 1);
        assert_eq!(scores[1].rank, 2);
    }

    #[test]
    fn test_signal_month_selects_next_month_holdings() {
        let mut agg = SentimentAggregator::new();
        agg.load_records(vec![
            rec(d(2021, 3, 15), "X", 100.0, 60.0),
            rec(d(2021, 3, 15), "Y", 100.0, 20.0),
            rec(d(2021, 12, 10), "Y", 100.0, 20.0),
        ]);
        agg.aggregate();
        agg.filter_top(1);
        let composition = agg.composition();

        assert_eq!(composition.start_dates(), vec![d(2021, 4, 1), d(2022, 1, 1)]);
        assert_eq!(composition.get(&d(2021, 4, 1)).unwrap(), &["X".to_string()]);
        assert_eq!(composition.get(&d(2022, 1, 1)).unwrap(), &["Y".to_string()]);
    }

    #[test]
    fn test_filter_top_orders_symbols_by_rank() {
        let mut agg = SentimentAggregator::new();
        agg.load_records(vec![
            rec(d(2021, 5, 3), "LOW", 100.0, 15.0),
            rec(d(2021, 5, 3), "HIGH", 100.0, 80.0),
            rec(d(2021, 5, 3), "MID", 100.0, 40.0),
        ]);
        agg.aggregate();
        assert_eq!(agg.filter_top(2), 2);
        let composition = agg.composition();
        assert_eq!(
            composition.get(&d(2021, 6, 1)).unwrap(),
            &["HIGH".to_string(), "MID".to_string()]
        );
    }

    #[tokio::test]
    async fn test_build_composition_two_month_scenario() {
        // Month 1: A (100 likes, 30 comments) and B (50, 15) tie on ratio;
        // month 2 has only sub-threshold activity.
        let source = StaticSource(vec![
            rec(d(2021, 1, 6), "A", 100.0, 30.0),
            rec(d(2021, 1, 6), "B", 50.0, 15.0),
            rec(d(2021, 2, 8), "A", 10.0, 3.0),
            rec(d(2021, 2, 8), "B", 5.0, 1.0),
        ]);

        let composition = SentimentAggregator::build_composition(&source, "memory", 1)
            .await
            .unwrap();

        let json = serde_json::to_string(&composition).unwrap();
        assert_eq!(json, r#"{"2021-02-01":["A"]}"#);
    }

    #[tokio::test]
    async fn test_build_composition_propagates_source_error() {
        struct Broken;

        #[async_trait]
        impl SentimentSource for Broken {
            async fn load(&self, _location: &str) -> Result<Vec<EngagementRecord>, PipelineError> {
                Err(PipelineError::DataSource("unreachable".into()))
            }
        }

        let result = SentimentAggregator::build_composition(&Broken, "x", 5).await;
        assert!(matches!(result, Err(PipelineError::DataSource(_))));
    }
}
