//! Error types for the research pipeline

use thiserror::Error;

/// Research pipeline errors
#[derive(Debug, Error)]
pub enum StockError {
    /// Request date could not be parsed; shown to the client
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Invalid subject id provided
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Price bars not available for the requested subject
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable {
        symbol: String,
        reason: String,
    },

    /// Yahoo Finance API error
    #[error("Yahoo Finance error: {0}")]
    YahooFinanceError(String),

    /// Durable store read or write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(String),

    /// Provider setup failed
    #[error("Provider error: {0}")]
    Provider(#[from] agent_llm::LLMError),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for stock operations
pub type Result<T> = std::result::Result<T, StockError>;

impl From<rusqlite::Error> for StockError {
    fn from(err: rusqlite::Error) -> Self {
        StockError::Persistence(err.to_string())
    }
}

impl From<minijinja::Error> for StockError {
    fn from(err: minijinja::Error) -> Self {
        StockError::Template(err.to_string())
    }
}

/// Convert StockError to agent_core::Error
impl From<StockError> for agent_core::Error {
    fn from(err: StockError) -> Self {
        agent_core::Error::ProcessingFailed(err.to_string())
    }
}

/// Convert agent_core::Error to StockError
impl From<agent_core::Error> for StockError {
    fn from(err: agent_core::Error) -> Self {
        StockError::Other(err.to_string())
    }
}
