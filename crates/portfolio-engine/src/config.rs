use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Instruments known to be delisted or unsupported upstream; never fetched.
pub const DEFAULT_EXCLUDED_SYMBOLS: &[&str] = &["MRO", "ATVI"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fetch_batch_size: usize,        // 15 symbols per upstream request
    pub fetch_max_workers: usize,       // 4 batches in flight
    pub rebalance_batch_size: usize,    // 5 holding periods per worker batch
    pub excluded_symbols: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_batch_size: 15,
            fetch_max_workers: 4,
            rebalance_batch_size: 5,
            excluded_symbols: DEFAULT_EXCLUDED_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            fetch_batch_size: env::var("FETCH_BATCH_SIZE")
                .unwrap_or_else(|_| defaults.fetch_batch_size.to_string())
                .parse()
                .context("FETCH_BATCH_SIZE must be a positive integer")?,
            fetch_max_workers: env::var("FETCH_MAX_WORKERS")
                .unwrap_or_else(|_| defaults.fetch_max_workers.to_string())
                .parse()
                .context("FETCH_MAX_WORKERS must be a positive integer")?,
            rebalance_batch_size: env::var("REBALANCE_BATCH_SIZE")
                .unwrap_or_else(|_| defaults.rebalance_batch_size.to_string())
                .parse()
                .context("REBALANCE_BATCH_SIZE must be a positive integer")?,
            excluded_symbols: match env::var("EXCLUDED_SYMBOLS") {
                Ok(list) => list
                    .split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Err(_) => defaults.excluded_symbols,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.fetch_batch_size > 0, "fetch batch size must be at least 1");
        ensure!(self.fetch_max_workers > 0, "fetch worker count must be at least 1");
        ensure!(self.rebalance_batch_size > 0, "rebalance batch size must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch_batch_size, 15);
        assert_eq!(config.fetch_max_workers, 4);
        assert_eq!(config.rebalance_batch_size, 5);
        assert_eq!(config.excluded_symbols, vec!["MRO".to_string(), "ATVI".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = EngineConfig {
            fetch_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
