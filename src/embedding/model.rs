//! Per-model embedding service backed by candle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::embedding::candle_backend::{download_model, select_device, BertEmbedder, ModelFiles};
use crate::embedding::EmbeddingService;
use crate::MemnonError;

/// Candle-backed embedding service for one configured model.
///
/// Load order: `local_path` when it exists, then `remote_path` via the Hub.
/// A failed load leaves the service constructed but unavailable; vector
/// strategies simply skip it.
pub struct CandleEmbeddingService {
    embedder: Option<Arc<BertEmbedder>>,
    dimensions: usize,
}

impl CandleEmbeddingService {
    pub fn load(model_key: &str, config: &ModelConfig) -> Self {
        let files = locate_files(model_key, config);

        let embedder = files.and_then(|files| {
            match BertEmbedder::new(&files, select_device()) {
                Ok(embedder) => Some(Arc::new(embedder)),
                Err(e) => {
                    warn!("Failed to load embedding model '{}': {}", model_key, e);
                    None
                }
            }
        });

        if embedder.is_some() {
            info!(
                "Embedding model '{}' loaded ({} dimensions)",
                model_key, config.dimensions
            );
        }

        Self {
            embedder,
            dimensions: config.dimensions,
        }
    }

    async fn run<F, T>(&self, op: F) -> Result<T, MemnonError>
    where
        F: FnOnce(Arc<BertEmbedder>) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| MemnonError::ModelUnavailable("embedding model not loaded".to_string()))?
            .clone();

        // candle operations are synchronous and CPU/GPU-bound
        tokio::task::spawn_blocking(move || op(embedder))
            .await
            .map_err(|e| MemnonError::EmbeddingFailed(format!("task join error: {}", e)))?
            .map_err(|e| MemnonError::EmbeddingFailed(e.to_string()))
    }
}

fn locate_files(model_key: &str, config: &ModelConfig) -> Option<ModelFiles> {
    if let Some(local) = &config.local_path {
        if local.is_dir() {
            match ModelFiles::from_dir(local) {
                Ok(files) => {
                    info!("Loading model '{}' from local path {}", model_key, local.display());
                    return Some(files);
                }
                Err(e) => {
                    warn!(
                        "Local path for '{}' is unusable ({}); trying remote",
                        model_key, e
                    );
                }
            }
        } else {
            warn!(
                "Local path for '{}' does not exist: {}",
                model_key,
                local.display()
            );
        }
    }

    if let Some(remote) = &config.remote_path {
        match download_model(remote) {
            Ok(files) => {
                info!("Loading model '{}' from remote path {}", model_key, remote);
                return Some(files);
            }
            Err(e) => {
                warn!("Failed to download model '{}' from '{}': {}", model_key, remote, e);
            }
        }
    }

    warn!(
        "Could not load embedding model '{}' from either local or remote paths",
        model_key
    );
    None
}

#[async_trait]
impl EmbeddingService for CandleEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemnonError> {
        let text = text.to_string();
        let embeddings = self.run(move |embedder| embedder.embed(&[text])).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemnonError::EmbeddingFailed("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemnonError> {
        let texts = texts.to_vec();
        self.run(move |embedder| embedder.embed(&texts)).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        self.embedder.is_some()
    }
}
