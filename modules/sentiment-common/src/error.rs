use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentimentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Polarity oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Per-record shape failures. These never abort a run; the record is skipped and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("text rejected by polarity oracle: {0}")]
    Rejected(String),
}
