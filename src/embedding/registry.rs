//! Multi-model embedding registry.
//!
//! Holds every active, successfully loaded embedding model with its fusion
//! weight. Retrieval code asks the registry for embeddings; models that
//! failed to load are absent and their strategies are skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::config::ModelConfig;
use crate::embedding::{CandleEmbeddingService, EmbeddingService};
use crate::MemnonError;

/// Last-resort models attempted when zero configured models load.
const DEFAULT_MODELS: &[(&str, &str, usize)] = &[
    ("bge-large", "BAAI/bge-large-en-v1.5", 1024),
    ("e5-large", "intfloat/e5-large-v2", 1024),
];

pub struct RegisteredModel {
    pub service: Arc<dyn EmbeddingService>,
    pub weight: f32,
    pub dimensions: usize,
}

pub struct EmbeddingRegistry {
    models: BTreeMap<String, RegisteredModel>,
}

impl EmbeddingRegistry {
    /// Load every active configured model. Failures are logged and skipped;
    /// if nothing loads, the hardcoded default set is attempted. An empty
    /// registry is not fatal — vector strategies are skipped.
    pub fn from_config(configs: &BTreeMap<String, ModelConfig>) -> Self {
        let mut models = BTreeMap::new();

        for (key, config) in configs {
            if !config.is_active {
                info!("Skipping inactive model: {}", key);
                continue;
            }
            let service = CandleEmbeddingService::load(key, config);
            if service.is_available() {
                models.insert(
                    key.clone(),
                    RegisteredModel {
                        service: Arc::new(service),
                        weight: config.weight,
                        dimensions: config.dimensions,
                    },
                );
            }
        }

        if models.is_empty() {
            warn!("No configured models loaded; attempting hardcoded defaults");
            for (key, repo, dimensions) in DEFAULT_MODELS {
                let config = ModelConfig {
                    remote_path: Some(repo.to_string()),
                    dimensions: *dimensions,
                    weight: 0.5,
                    ..ModelConfig::default()
                };
                let service = CandleEmbeddingService::load(key, &config);
                if service.is_available() {
                    models.insert(
                        key.to_string(),
                        RegisteredModel {
                            service: Arc::new(service),
                            weight: 0.5,
                            dimensions: *dimensions,
                        },
                    );
                }
            }
        }

        if models.is_empty() {
            error!("No active embedding models could be loaded; vector search will be unavailable");
        } else {
            info!(
                "Embedding registry initialized with {} active models: {}",
                models.len(),
                models.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        Self { models }
    }

    /// Registry over pre-built services; used by tests.
    pub fn with_models(models: BTreeMap<String, RegisteredModel>) -> Self {
        Self { models }
    }

    /// Keys of active, successfully loaded models.
    pub fn available_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Fusion weight per available model.
    pub fn weights(&self) -> BTreeMap<String, f32> {
        self.models
            .iter()
            .map(|(key, model)| (key.clone(), model.weight))
            .collect()
    }

    /// Embed one text with a specific model.
    pub async fn embed(&self, text: &str, model_key: &str) -> Result<Vec<f32>, MemnonError> {
        if text.trim().is_empty() {
            return Err(MemnonError::EmptyInput);
        }
        let model = self
            .models
            .get(model_key)
            .ok_or_else(|| MemnonError::ModelUnavailable(model_key.to_string()))?;
        model.service.embed(text).await
    }

    /// Embed a batch, silently dropping empty texts while preserving the
    /// order of kept inputs.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        model_key: &str,
    ) -> Result<Vec<Vec<f32>>, MemnonError> {
        let model = self
            .models
            .get(model_key)
            .ok_or_else(|| MemnonError::ModelUnavailable(model_key.to_string()))?;

        let kept: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if kept.len() < texts.len() {
            warn!(
                "Filtered {} empty texts from embedding batch",
                texts.len() - kept.len()
            );
        }
        if kept.is_empty() {
            return Ok(vec![]);
        }
        model.service.embed_batch(&kept).await
    }

    /// Embed the query with every available model concurrently. Models whose
    /// inference fails are logged and omitted from the result.
    pub async fn embed_all(&self, text: &str) -> BTreeMap<String, Vec<f32>> {
        let futures = self.models.keys().map(|key| {
            let key = key.clone();
            async move {
                match self.embed(text, &key).await {
                    Ok(embedding) => Some((key, embedding)),
                    Err(e) => {
                        error!("Error generating embedding for model {}: {}", key, e);
                        None
                    }
                }
            }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic embedder: every vector is `[value; dimensions]`.
    struct StaticEmbeddingService {
        value: f32,
        dimensions: usize,
    }

    #[async_trait]
    impl EmbeddingService for StaticEmbeddingService {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemnonError> {
            Ok(vec![self.value; self.dimensions])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemnonError> {
            Ok(texts.iter().map(|_| vec![self.value; self.dimensions]).collect())
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn registry() -> EmbeddingRegistry {
        let mut models = BTreeMap::new();
        models.insert(
            "bge-large".to_string(),
            RegisteredModel {
                service: Arc::new(StaticEmbeddingService {
                    value: 0.5,
                    dimensions: 4,
                }),
                weight: 0.6,
                dimensions: 4,
            },
        );
        models.insert(
            "e5-large".to_string(),
            RegisteredModel {
                service: Arc::new(StaticEmbeddingService {
                    value: 0.25,
                    dimensions: 4,
                }),
                weight: 0.4,
                dimensions: 4,
            },
        );
        EmbeddingRegistry::with_models(models)
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.embed("   ", "bge-large").await,
            Err(MemnonError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn unknown_model_is_unavailable() {
        let registry = registry();
        assert!(matches!(
            registry.embed("text", "missing").await,
            Err(MemnonError::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn batch_filters_empty_texts_preserving_order() {
        let registry = registry();
        let texts = vec![
            "first".to_string(),
            "  ".to_string(),
            "third".to_string(),
            String::new(),
        ];
        let embeddings = registry.embed_batch(&texts, "bge-large").await.expect("batch");
        assert_eq!(embeddings.len(), 2);
    }

    #[tokio::test]
    async fn embed_all_covers_every_model() {
        let registry = registry();
        let embeddings = registry.embed_all("the neon rain").await;
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings["bge-large"], vec![0.5; 4]);
        assert_eq!(embeddings["e5-large"], vec![0.25; 4]);
    }

    #[test]
    fn weights_and_availability() {
        let registry = registry();
        assert_eq!(
            registry.available_models(),
            vec!["bge-large".to_string(), "e5-large".to_string()]
        );
        assert_eq!(registry.weights()["bge-large"], 0.6);
        assert!(!registry.is_empty());
    }
}
