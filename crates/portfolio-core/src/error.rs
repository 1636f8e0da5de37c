use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Sentiment or price source unreachable or malformed, or no price data at all.
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Sentiment data produced no qualifying months")]
    EmptyComposition,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
