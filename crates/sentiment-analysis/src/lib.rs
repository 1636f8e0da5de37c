//! Social-engagement sentiment signal: loading the raw dataset and turning it
//! into a monthly rebalance schedule.

pub mod aggregator;
pub mod source;

pub use aggregator::SentimentAggregator;
pub use source::{parse_engagement_csv, CsvSentimentSource};
