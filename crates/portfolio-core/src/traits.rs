use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{EngagementRecord, PipelineError, PricePoint};

/// Upstream provider of daily price history.
///
/// A call may return partial data (some symbols missing) on transient
/// failure; an `Err` means nothing usable came back for the whole request.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, PipelineError>;
}

/// Provider of raw social-engagement records (`date, symbol, likes, comments`).
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn load(&self, location: &str) -> Result<Vec<EngagementRecord>, PipelineError>;
}
