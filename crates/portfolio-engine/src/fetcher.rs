use chrono::NaiveDate;
use portfolio_core::{PriceHistorySource, PriceTable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::EngineConfig;

/// Fetches price history for a symbol universe in fixed-size batches, with a
/// bounded number of batches in flight against the upstream source.
#[derive(Clone)]
pub struct BatchedDataFetcher {
    source: Arc<dyn PriceHistorySource>,
    batch_size: usize,
    max_workers: usize,
    excluded: Vec<String>,
}

impl BatchedDataFetcher {
    pub fn new(source: Arc<dyn PriceHistorySource>, config: &EngineConfig) -> Self {
        Self {
            source,
            batch_size: config.fetch_batch_size.max(1),
            max_workers: config.fetch_max_workers.max(1),
            excluded: config.excluded_symbols.clone(),
        }
    }

    /// Drop excluded instruments, then split into batches of `batch_size`.
    pub fn partition(&self, symbols: &[String]) -> Vec<Vec<String>> {
        let kept: Vec<String> = symbols
            .iter()
            .filter(|s| !self.excluded.iter().any(|ex| ex.eq_ignore_ascii_case(s)))
            .cloned()
            .collect();
        kept.chunks(self.batch_size).map(|c| c.to_vec()).collect()
    }

    /// Column-wise union of every batch that produced data. A failed or empty
    /// batch only loses its own symbols; if every batch fails the table is
    /// empty and the caller decides whether that is fatal.
    pub async fn fetch_prices(&self, symbols: &[String], start: NaiveDate, end: NaiveDate) -> PriceTable {
        let started = Instant::now();
        let batches = self.partition(symbols);
        let total_batches = batches.len();
        tracing::info!(
            "Downloading {} symbols in {} batches (max {} concurrent)",
            batches.iter().map(Vec::len).sum::<usize>(),
            total_batches,
            self.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(total_batches);

        for (idx, batch) in batches.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return PriceTable::new();
                };

                let result = source.fetch(&batch, start, end).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                match result {
                    Ok(points) => {
                        let table = PriceTable::from_points(points);
                        if table.is_empty() {
                            tracing::warn!(
                                "[{}/{}] batch {} ({}...) returned no rows",
                                done, total_batches, idx + 1, preview(&batch)
                            );
                        } else {
                            tracing::info!(
                                "[{}/{}] batch {} => {}/{} symbols",
                                done, total_batches, idx + 1, table.len(), batch.len()
                            );
                        }
                        table
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[{}/{}] batch {} ({}...) failed: {}",
                            done, total_batches, idx + 1, preview(&batch), e
                        );
                        PriceTable::new()
                    }
                }
            });

            handles.push(handle);
        }

        let mut merged = PriceTable::new();
        for handle in handles {
            match handle.await {
                Ok(table) => merged.merge(table),
                Err(e) => tracing::warn!("Price batch task aborted: {}", e),
            }
        }

        if merged.is_empty() {
            tracing::warn!("No price data could be downloaded for {} symbols", symbols.len());
        } else {
            tracing::info!(
                "Download finished in {:.2}s: {} symbols, {} dates",
                started.elapsed().as_secs_f64(),
                merged.len(),
                merged.dates().len()
            );
        }
        merged
    }
}

fn preview(batch: &[String]) -> String {
    batch.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
}
