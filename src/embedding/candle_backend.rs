//! Candle inference backend for embedding and reranking models.
//!
//! Pure-Rust ML runtime with optional Metal/CUDA acceleration. Provides
//! [`BertEmbedder`] for sentence embeddings (BGE/E5 family) and
//! [`CrossEncoderScorer`] for query-passage relevance logits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::xlm_roberta::{
    Config as XLMRobertaConfig, XLMRobertaForSequenceClassification,
};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Paths to the three files a model needs.
pub struct ModelFiles {
    pub config_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub weights_path: PathBuf,
}

impl ModelFiles {
    /// Locate model files inside a local directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let files = Self {
            config_path: dir.join("config.json"),
            tokenizer_path: dir.join("tokenizer.json"),
            weights_path: dir.join("model.safetensors"),
        };
        for path in [&files.config_path, &files.tokenizer_path, &files.weights_path] {
            if !path.is_file() {
                anyhow::bail!("model file missing: {}", path.display());
            }
        }
        Ok(files)
    }
}

/// Download model files from HuggingFace Hub (cached under
/// `~/.cache/huggingface/hub/`). Performs synchronous I/O; call from
/// `spawn_blocking` or startup code.
pub fn download_model(repo_id: &str) -> Result<ModelFiles> {
    let api = hf_hub::api::sync::Api::new().context("Failed to initialize HuggingFace Hub API")?;
    let repo = api.model(repo_id.to_string());

    Ok(ModelFiles {
        config_path: repo.get("config.json").context("Failed to download config.json")?,
        tokenizer_path: repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer.json")?,
        weights_path: repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors")?,
    })
}

/// Select the best available compute device, probing layer-norm support
/// since BERT/RoBERTa require it.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            if probe_layer_norm(&device) {
                tracing::info!("Using Metal GPU for inference");
                return device;
            }
            tracing::warn!("Metal GPU available but layer-norm not supported, falling back to CPU");
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            if probe_layer_norm(&device) {
                tracing::info!("Using CUDA GPU for inference");
                return device;
            }
            tracing::warn!("CUDA GPU available but layer-norm not supported, falling back to CPU");
        }
    }
    tracing::info!("Using CPU for inference");
    Device::Cpu
}

#[allow(dead_code)]
fn probe_layer_norm(device: &Device) -> bool {
    (|| -> candle_core::Result<()> {
        let weight = Tensor::ones(4, DType::F32, device)?;
        let bias = Tensor::zeros(4, DType::F32, device)?;
        let ln = LayerNorm::new(weight, bias, 1e-5);
        let input = Tensor::randn(0f32, 1.0, (1, 4), device)?;
        let _ = ln.forward(&input)?;
        Ok(())
    })()
    .is_ok()
}

fn load_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer =
        Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;
    Ok(tokenizer)
}

/// Stack token ids and attention masks from a batch of encodings into
/// `[batch, max_len]` tensors.
fn batch_tensors(encodings: &[Encoding], device: &Device) -> Result<(Tensor, Tensor)> {
    let batch_size = encodings.len();
    let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

    let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
    let mask: Vec<u32> = encodings
        .iter()
        .flat_map(|e| e.get_attention_mask().to_vec())
        .collect();

    let input_ids = Tensor::from_vec(ids, (batch_size, max_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (batch_size, max_len), device)?;
    Ok((input_ids, attention_mask))
}

/// BERT-based text embedder: mean pooling over masked hidden states,
/// L2-normalized output. Compatible with the BGE and E5 model families.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertEmbedder {
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(&files.config_path).context("Failed to read model config")?;
        let config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;

        let tokenizer = load_tokenizer(&files.tokenizer_path, 512)?;

        // SAFETY: mmap'd safetensors file — safe as long as the file is not
        // modified while the model is in use.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to construct BERT model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Embed a batch of texts, one vector per input.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let inputs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let (input_ids, attention_mask) = batch_tensors(&encodings, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        // Forward pass -> [batch, seq_len, hidden_size]
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling: zero out padding, sum, divide by token count
        let mask_f32 = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask_f32)?.sum(1)?;
        let counts = mask_f32.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;

        // L2 normalize
        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norms)?;

        normalized
            .to_vec2::<f32>()
            .context("Failed to convert embeddings to Vec")
    }
}

/// Cross-encoder scorer: XLM-RoBERTa sequence classification over
/// (query, passage) pairs. Returns raw logits; score normalization is the
/// caller's concern.
pub struct CrossEncoderScorer {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoderScorer {
    pub fn new(files: &ModelFiles, device: Device, max_length: usize) -> Result<Self> {
        let config_str = std::fs::read_to_string(&files.config_path)
            .context("Failed to read reranker config")?;
        let config: XLMRobertaConfig =
            serde_json::from_str(&config_str).context("Failed to parse XLM-RoBERTa config")?;

        let tokenizer = load_tokenizer(&files.tokenizer_path, max_length)?;

        // SAFETY: mmap'd safetensors file — safe as long as the file is not
        // modified while the model is in use.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, &device)
                .context("Failed to load reranker weights")?
        };
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)
            .context("Failed to construct XLM-RoBERTa model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Raw relevance logits for query-passage pairs, one per pair.
    pub fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }

        let pair_refs: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(q, d)| (q.as_str(), d.as_str()))
            .collect();
        let encodings = self
            .tokenizer
            .encode_batch(pair_refs, true)
            .map_err(|e| anyhow::anyhow!("Reranker tokenization failed: {}", e))?;

        let (input_ids, attention_mask) = batch_tensors(&encodings, &self.device)?;
        // XLM-RoBERTa does not use token_type_ids — pass zeros
        let token_type_ids = input_ids.zeros_like()?;

        // Forward pass -> [batch, 1] logits
        let logits = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids)?;

        Ok(logits.flatten_all()?.to_vec1::<f32>()?)
    }
}
