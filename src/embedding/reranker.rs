//! Cross-encoder re-ranking with sliding-window support for long passages.
//!
//! The cross-encoder reads query and passage together, which orders
//! relevance far better than bi-encoder similarity but costs a forward pass
//! per pair. It is loaded lazily on the first rerank and shared afterwards.
//! Passages longer than the model's context are split into sentence-aligned
//! windows; the best window score wins.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::CrossEncoderConfig;
use crate::embedding::candle_backend::{
    download_model, select_device, CrossEncoderScorer, ModelFiles,
};
use crate::MemnonError;

/// Service trait for cross-encoder scoring.
#[async_trait]
pub trait RerankerService: Send + Sync {
    /// Score each passage against the query, in input order, on [0, 1].
    async fn score_batch(&self, query: &str, passages: &[String])
        -> Result<Vec<f32>, MemnonError>;
}

/// Clamp a raw model output into [0, 1], applying a sigmoid only when it
/// escapes the range (some checkpoints emit probabilities, others logits).
pub fn normalize_score(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        1.0 / (1.0 + (-raw).exp())
    }
}

/// Blend a fused retrieval score with a reranker score.
/// `alpha` is the fused score's share.
pub fn blend_scores(alpha: f32, fused: f32, reranker: f32) -> f32 {
    let fused = fused.clamp(0.0, 1.0);
    alpha * fused + (1.0 - alpha) * reranker
}

/// Split text into sentences on `.`/`?`/`!` boundaries followed by
/// whitespace. Text without terminal punctuation comes back whole.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            match chars.peek() {
                Some(next) if next.is_whitespace() => {
                    let sentence = current.trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    current.clear();
                }
                None => {}
                _ => {}
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Greedily pack sentences into windows bounded by a character budget. A
/// single over-budget sentence still becomes its own window.
pub fn pack_windows(sentences: &[String], budget_chars: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        if !current.is_empty() && current_len + sentence.len() > budget_chars {
            windows.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(sentence);
        current_len += sentence.len();
    }
    if !current.is_empty() {
        windows.push(current.join(" "));
    }
    windows
}

/// Interleave bridge windows between adjacent chunks: the tail words of one
/// chunk joined with the head words of the next, so matches spanning a
/// window boundary are not lost.
pub fn overlap_windows(chunks: &[String], overlap_words: usize) -> Vec<String> {
    if chunks.len() < 2 || overlap_words == 0 {
        return chunks.to_vec();
    }

    let mut windows = Vec::with_capacity(chunks.len() * 2 - 1);
    for (i, chunk) in chunks.iter().enumerate() {
        windows.push(chunk.clone());
        if i + 1 < chunks.len() {
            let tail: Vec<&str> = chunk
                .split_whitespace()
                .rev()
                .take(overlap_words)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let head: Vec<&str> = chunks[i + 1].split_whitespace().take(overlap_words).collect();
            let bridge = [tail, head].concat().join(" ");
            if !bridge.is_empty() {
                windows.push(bridge);
            }
        }
    }
    windows
}

/// Windows to score for one passage. Short passages score directly; long
/// ones are sentence-packed with overlap bridges.
pub fn passage_windows(passage: &str, budget_chars: usize, overlap_words: usize) -> Vec<String> {
    if passage.len() < budget_chars {
        return vec![passage.to_string()];
    }

    let sentences = split_into_sentences(passage);
    let chunks = if sentences.len() <= 1 {
        // no sentence structure to align on; split on whitespace runs
        character_chunks(passage, budget_chars)
    } else {
        pack_windows(&sentences, budget_chars)
    };
    overlap_windows(&chunks, overlap_words)
}

fn character_chunks(text: &str, budget_chars: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    for word in words {
        if !current.is_empty() && current_len + word.len() + 1 > budget_chars {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current_len += word.len() + 1;
        current.push(word);
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Lazily loaded candle cross-encoder.
pub struct CandleRerankerService {
    config: CrossEncoderConfig,
    scorer: OnceCell<Option<Arc<CrossEncoderScorer>>>,
}

impl CandleRerankerService {
    pub fn new(config: CrossEncoderConfig) -> Self {
        Self {
            config,
            scorer: OnceCell::new(),
        }
    }

    /// Character budget approximating the model's token context.
    fn window_budget(&self) -> usize {
        self.config.max_length * 4
    }

    async fn scorer(&self) -> Option<Arc<CrossEncoderScorer>> {
        self.scorer
            .get_or_init(|| async {
                if self.config.use_8bit {
                    warn!("8-bit quantization is not supported by the candle backend; loading full precision");
                }
                let model_path = self.config.model_path.clone();
                let max_length = self.config.max_length;
                let loaded = tokio::task::spawn_blocking(move || {
                    let files = if Path::new(&model_path).is_dir() {
                        ModelFiles::from_dir(Path::new(&model_path))
                    } else {
                        download_model(&model_path)
                    }?;
                    CrossEncoderScorer::new(&files, select_device(), max_length)
                })
                .await;

                match loaded {
                    Ok(Ok(scorer)) => {
                        info!("Cross-encoder model loaded: {}", self.config.model_path);
                        Some(Arc::new(scorer))
                    }
                    Ok(Err(e)) => {
                        warn!("Failed to load cross-encoder model: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!("Cross-encoder load task failed: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn score_pairs(
        &self,
        scorer: &Arc<CrossEncoderScorer>,
        pairs: Vec<(String, String)>,
    ) -> Result<Vec<f32>, MemnonError> {
        let batch_size = self.config.batch_size.max(1);
        let mut scores = Vec::with_capacity(pairs.len());

        for batch in pairs.chunks(batch_size) {
            let scorer = scorer.clone();
            let batch = batch.to_vec();
            let raw = tokio::task::spawn_blocking(move || scorer.score_pairs(&batch))
                .await
                .map_err(|e| MemnonError::RerankFailure(format!("task join error: {}", e)))?
                .map_err(|e| MemnonError::RerankFailure(e.to_string()))?;
            scores.extend(raw.into_iter().map(normalize_score));
        }
        Ok(scores)
    }
}

#[async_trait]
impl RerankerService for CandleRerankerService {
    async fn score_batch(
        &self,
        query: &str,
        passages: &[String],
    ) -> Result<Vec<f32>, MemnonError> {
        if passages.is_empty() {
            return Ok(vec![]);
        }

        let scorer = self
            .scorer()
            .await
            .ok_or_else(|| MemnonError::ModelUnavailable(self.config.model_path.clone()))?;

        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            let windows = if self.config.use_sliding_window {
                passage_windows(passage, self.window_budget(), self.config.window_overlap / 10)
            } else {
                vec![passage.clone()]
            };
            let pairs: Vec<(String, String)> = windows
                .into_iter()
                .map(|w| (query.to_string(), w))
                .collect();
            let window_scores = self.score_pairs(&scorer, pairs).await?;
            scores.push(window_scores.into_iter().fold(0.0f32, f32::max));
        }
        Ok(scores)
    }
}

/// No-op reranker for tests; always fails so callers exercise the
/// degradation path.
pub struct NoopRerankerService;

#[async_trait]
impl RerankerService for NoopRerankerService {
    async fn score_batch(
        &self,
        _query: &str,
        _passages: &[String],
    ) -> Result<Vec<f32>, MemnonError> {
        Err(MemnonError::ModelUnavailable("noop".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_into_sentences("She ran. He followed! Did they make it? Yes.");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "She ran.");
        assert_eq!(sentences[2], "Did they make it?");
    }

    #[test]
    fn unpunctuated_text_stays_whole() {
        let sentences = split_into_sentences("a long breathless passage with no stops");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn abbreviation_like_dots_mid_word_do_not_split() {
        let sentences = split_into_sentences("v2.0 shipped quietly. Everyone noticed.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn packing_respects_the_budget() {
        let sentences: Vec<String> = (0..6).map(|i| format!("sentence number {i}.")).collect();
        let windows = pack_windows(&sentences, 40);
        assert!(windows.len() > 1);
        for window in &windows {
            // a window may exceed the budget only if a single sentence does
            assert!(window.len() <= 40 + sentences[0].len());
        }
        // nothing is lost
        let rejoined = windows.join(" ");
        for sentence in &sentences {
            assert!(rejoined.contains(sentence.as_str()));
        }
    }

    #[test]
    fn oversized_sentence_becomes_its_own_window() {
        let sentences = vec!["x".repeat(100), "short.".to_string()];
        let windows = pack_windows(&sentences, 40);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn bridges_interleave_between_chunks() {
        let chunks = vec![
            "one two three four".to_string(),
            "five six seven eight".to_string(),
        ];
        let windows = overlap_windows(&chunks, 2);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1], "three four five six");
    }

    #[test]
    fn short_passage_is_a_single_window() {
        let windows = passage_windows("brief.", 2048, 12);
        assert_eq!(windows, vec!["brief.".to_string()]);
    }

    #[test]
    fn long_passage_produces_overlapping_windows() {
        let passage = (0..40)
            .map(|i| format!("This is sentence number {i} in a long passage."))
            .collect::<Vec<_>>()
            .join(" ");
        let windows = passage_windows(&passage, 200, 4);
        assert!(windows.len() > 2);
    }

    #[test]
    fn normalize_passes_in_range_scores_through() {
        assert_eq!(normalize_score(0.0), 0.0);
        assert_eq!(normalize_score(0.42), 0.42);
        assert_eq!(normalize_score(1.0), 1.0);
    }

    #[test]
    fn normalize_squashes_logits() {
        let squashed = normalize_score(4.0);
        assert!(squashed > 0.9 && squashed < 1.0);
        let negative = normalize_score(-4.0);
        assert!(negative > 0.0 && negative < 0.1);
    }

    #[test]
    fn blend_weights_the_fused_share() {
        assert!((blend_scores(0.3, 1.0, 0.0) - 0.3).abs() < 1e-6);
        assert!((blend_scores(0.3, 0.0, 1.0) - 0.7).abs() < 1e-6);
        // out-of-range fused scores are clamped before blending
        assert!((blend_scores(0.5, 1.7, 0.5) - 0.75).abs() < 1e-6);
    }
}
