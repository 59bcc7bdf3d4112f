//! Embedding and reranking model infrastructure.
//!
//! Sentence embeddings run on candle BERT models; relevance re-scoring uses
//! an XLM-RoBERTa cross-encoder. The [`EmbeddingService`] trait abstracts a
//! single model; [`registry::EmbeddingRegistry`] manages the configured set
//! and is what the retrieval pipeline talks to.

pub mod candle_backend;
pub mod model;
pub mod registry;
pub mod reranker;

use async_trait::async_trait;

use crate::MemnonError;

pub use model::CandleEmbeddingService;
pub use registry::EmbeddingRegistry;
pub use reranker::{CandleRerankerService, RerankerService};

/// One embedding model: text in, fixed-length vector out.
///
/// Callers validate input; implementations may assume non-empty text.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemnonError>;

    /// Embed a batch of texts, one vector per input, order preserved.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemnonError>;

    /// Declared output dimensionality.
    fn dimensions(&self) -> usize;

    /// False when the model failed to load; such services error on embed.
    fn is_available(&self) -> bool;
}

/// No-op embedding service for tests: unavailable, errors on embed.
pub struct NoopEmbeddingService {
    dimensions: usize,
}

impl NoopEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemnonError> {
        Err(MemnonError::ModelUnavailable("noop".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, MemnonError> {
        Err(MemnonError::ModelUnavailable("noop".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        false
    }
}
