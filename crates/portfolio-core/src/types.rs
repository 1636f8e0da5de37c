use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Date-indexed values for a single symbol (or a single portfolio).
pub type TimeSeries = BTreeMap<NaiveDate, f64>;

/// Minimum likes (exclusive) for a record to count toward the signal
pub const MIN_LIKE_COUNT: f64 = 20.0;
/// Minimum comments (exclusive) for a record to count toward the signal
pub const MIN_COMMENT_COUNT: f64 = 10.0;

/// Raw social engagement observation for a symbol on a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub like_count: f64,
    pub comment_count: f64,
}

impl EngagementRecord {
    pub fn engagement_ratio(&self) -> f64 {
        self.comment_count / self.like_count
    }

    /// Sub-threshold records are dropped before aggregation. Missing counts
    /// (NaN) never qualify.
    pub fn qualifies(&self) -> bool {
        self.like_count > MIN_LIKE_COUNT && self.comment_count > MIN_COMMENT_COUNT
    }
}

/// Mean engagement ratio of a symbol over one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyScore {
    pub month_end: NaiveDate,
    pub symbol: String,
    pub mean_engagement_ratio: f64,
    /// 1-based position within the month, highest ratio first. Tied ratios
    /// still get distinct ranks, ordered by symbol.
    pub rank: usize,
}

/// Holding-start date -> symbols held from that date to its month end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortfolioComposition(BTreeMap<NaiveDate, Vec<String>>);

impl PortfolioComposition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, start: NaiveDate, symbols: Vec<String>) {
        self.0.insert(start, symbols);
    }

    pub fn get(&self, start: &NaiveDate) -> Option<&[String]> {
        self.0.get(start).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Vec<String>)> {
        self.0.iter()
    }

    pub fn start_dates(&self) -> Vec<NaiveDate> {
        self.0.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every symbol held at least once, in lexical order.
    pub fn unique_symbols(&self) -> BTreeSet<String> {
        self.0.values().flatten().cloned().collect()
    }

    /// Number of holding periods each symbol appears in, most frequent first
    /// (ties in lexical order).
    pub fn holding_frequency(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for symbol in self.0.values().flatten() {
            *counts.entry(symbol.as_str()).or_insert(0) += 1;
        }
        let mut freq: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(s, n)| (s.to_string(), n))
            .collect();
        freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        freq
    }
}

impl FromIterator<(NaiveDate, Vec<String>)> for PortfolioComposition {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Price field carried by the upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

impl PriceField {
    /// Parse a column label in any of the common spellings
    /// (`"Adj Close"`, `"adjclose"`, `"adj_close"`, `"Close"`...).
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "adjclose" | "adjustedclose" => Some(PriceField::AdjClose),
            "volume" => Some(PriceField::Volume),
            _ => None,
        }
    }
}

/// One observation of the typed price schema `{symbol, field, date, value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub field: PriceField,
    pub date: NaiveDate,
    pub value: f64,
}

impl PricePoint {
    pub fn new(symbol: impl Into<String>, field: PriceField, date: NaiveDate, value: f64) -> Self {
        Self {
            symbol: symbol.into(),
            field,
            date,
            value,
        }
    }
}

/// Symbol -> adjusted close series. Dates a symbol has no quote for are
/// simply absent from its series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    columns: BTreeMap<String, TimeSeries>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the adjusted-close field once, at ingestion. A symbol that
    /// carries no adjusted close at all falls back to its close field.
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut adjusted: BTreeMap<String, TimeSeries> = BTreeMap::new();
        let mut close: BTreeMap<String, TimeSeries> = BTreeMap::new();

        for point in points {
            if !point.value.is_finite() {
                continue;
            }
            let target = match point.field {
                PriceField::AdjClose => &mut adjusted,
                PriceField::Close => &mut close,
                _ => continue,
            };
            target
                .entry(point.symbol)
                .or_default()
                .insert(point.date, point.value);
        }

        for (symbol, series) in close {
            adjusted.entry(symbol).or_insert(series);
        }
        adjusted.retain(|_, series| !series.is_empty());

        Self { columns: adjusted }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, series: TimeSeries) {
        if !series.is_empty() {
            self.columns.insert(symbol.into(), series);
        }
    }

    /// Column-wise outer union. Overlapping symbols keep both date sets.
    pub fn merge(&mut self, other: PriceTable) {
        for (symbol, series) in other.columns {
            self.columns.entry(symbol).or_default().extend(series);
        }
    }

    pub fn column(&self, symbol: &str) -> Option<&TimeSeries> {
        self.columns.get(symbol)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &TimeSeries)> {
        self.columns.iter()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Union of every symbol's dates
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.columns.values().flat_map(|s| s.keys().copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Symbol -> daily log returns. Symbols may start on different dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnSeries {
    columns: BTreeMap<String, TimeSeries>,
}

impl ReturnSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, series: TimeSeries) {
        self.columns.insert(symbol.into(), series);
    }

    pub fn column(&self, symbol: &str) -> Option<&TimeSeries> {
        self.columns.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.columns.contains_key(symbol)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &TimeSeries)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Summary statistics comparing the portfolio to its benchmark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_portfolio_return: f64,
    pub total_benchmark_return: f64,
    pub excess_return: f64,
    pub portfolio_volatility: f64,
    pub benchmark_volatility: f64,
    pub sharpe_ratio: f64,
    pub period_count: usize,
    pub unique_symbol_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_engagement_thresholds_are_exclusive() {
        let mut rec = EngagementRecord {
            date: d(2021, 1, 4),
            symbol: "AAPL".into(),
            like_count: 21.0,
            comment_count: 11.0,
        };
        assert!(rec.qualifies());
        rec.like_count = 20.0;
        assert!(!rec.qualifies());
        rec.like_count = f64::NAN;
        assert!(!rec.qualifies());
    }

    #[test]
    fn test_price_field_parse() {
        assert_eq!(PriceField::parse("Adj Close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::parse("adjclose"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::parse("adj_close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::parse("Close"), Some(PriceField::Close));
        assert_eq!(PriceField::parse("Dividends"), None);
    }

    #[test]
    fn test_from_points_prefers_adjusted_close() {
        let points = vec![
            PricePoint::new("AAPL", PriceField::Close, d(2021, 1, 4), 130.0),
            PricePoint::new("AAPL", PriceField::AdjClose, d(2021, 1, 4), 128.5),
            PricePoint::new("AAPL", PriceField::Volume, d(2021, 1, 4), 1e6),
            // No adjusted close: flat single-field layout
            PricePoint::new("MSFT", PriceField::Close, d(2021, 1, 4), 217.0),
            PricePoint::new("NVDA", PriceField::AdjClose, d(2021, 1, 4), f64::NAN),
        ];
        let table = PriceTable::from_points(points);
        assert_eq!(table.symbols(), vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(table.column("AAPL").unwrap()[&d(2021, 1, 4)], 128.5);
        assert_eq!(table.column("MSFT").unwrap()[&d(2021, 1, 4)], 217.0);
    }

    #[test]
    fn test_merge_is_outer_union() {
        let mut left = PriceTable::new();
        left.insert("A", TimeSeries::from([(d(2021, 1, 4), 1.0)]));
        let mut right = PriceTable::new();
        right.insert("B", TimeSeries::from([(d(2021, 1, 5), 2.0)]));
        left.merge(right);

        assert_eq!(left.len(), 2);
        assert_eq!(left.dates().len(), 2);
        // No interpolation: A has nothing on the 5th
        assert!(left.column("A").unwrap().get(&d(2021, 1, 5)).is_none());
    }

    #[test]
    fn test_holding_frequency_orders_by_count_then_symbol() {
        let composition: PortfolioComposition = [
            (d(2021, 2, 1), vec!["B".to_string(), "A".to_string()]),
            (d(2021, 3, 1), vec!["B".to_string(), "C".to_string()]),
        ]
        .into_iter()
        .collect();

        let freq = composition.holding_frequency();
        assert_eq!(freq[0], ("B".to_string(), 2));
        assert_eq!(freq[1], ("A".to_string(), 1));
        assert_eq!(freq[2], ("C".to_string(), 1));
        assert_eq!(composition.unique_symbols().len(), 3);
    }

    #[test]
    fn test_composition_serializes_with_iso_keys() {
        let composition: PortfolioComposition =
            [(d(2021, 2, 1), vec!["A".to_string()])].into_iter().collect();
        let json = serde_json::to_string(&composition).unwrap();
        assert_eq!(json, r#"{"2021-02-01":["A"]}"#);
    }
}
