use thiserror::Error;

/// Custom error type for retrieval operations.
#[derive(Debug, Error)]
pub enum MemnonError {
    /// Missing or invalid configuration, or a required capability is absent.
    /// Surfaced at startup; aborts initialization.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An embedding or reranker model is inactive or failed to load.
    #[error("Model unavailable: '{0}'")]
    ModelUnavailable(String),

    /// Database connection, query, or timeout failure. Scoped to a single
    /// search strategy; other strategies continue.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model inference failed for reasons other than availability.
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Empty or whitespace-only input text.
    #[error("Empty input")]
    EmptyInput,

    /// Malformed query input or filters, rejected before execution.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cross-encoder reranking failed; callers pass fused results through.
    #[error("Rerank failure: {0}")]
    RerankFailure(String),
}

impl From<sqlx::Error> for MemnonError {
    fn from(err: sqlx::Error) -> Self {
        MemnonError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MemnonError {
    fn from(err: serde_json::Error) -> Self {
        MemnonError::Storage(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for MemnonError {
    fn from(err: std::io::Error) -> Self {
        MemnonError::Storage(format!("I/O error: {}", err))
    }
}
