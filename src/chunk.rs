//! Corpus text chunking.
//!
//! The preferred strategy is semantic: sentences are embedded and a
//! chunk boundary is placed wherever the cosine distance between
//! adjacent sentences exceeds `mean + breakpoint_std_mult × std-dev`.
//! When that strategy is unavailable (provider disabled, embedding
//! failure, too little text to segment), splitting falls back
//! deterministically to fixed windows of whitespace tokens with a
//! configurable overlap. Every chunk records which strategy produced it.

use tracing::warn;

use crate::config::ChunkingConfig;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::{DocumentChunk, SplitMethod};

/// Split one document into chunks tagged with their source path.
///
/// Never fails: strategy errors degrade to the fixed-window fallback.
/// Empty or whitespace-only text yields no chunks.
pub async fn chunk_document(
    embedder: &dyn EmbeddingProvider,
    config: &ChunkingConfig,
    source_path: &str,
    text: &str,
) -> Vec<DocumentChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if config.strategy == "semantic" {
        match split_semantic(embedder, config, text).await {
            Ok(pieces) if !pieces.is_empty() => {
                return assemble(source_path, pieces, SplitMethod::Semantic);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(source_path, error = %e, "semantic split unavailable, using fixed windows");
            }
        }
    }

    let pieces = split_fixed(text, config.window_tokens, config.overlap_tokens);
    assemble(source_path, pieces, SplitMethod::FixedWindow)
}

fn assemble(source_path: &str, pieces: Vec<String>, method: SplitMethod) -> Vec<DocumentChunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| DocumentChunk {
            content,
            source_path: source_path.to_string(),
            index,
            split_method: method,
        })
        .collect()
}

/// Fixed windows over whitespace tokens; consecutive windows share
/// `overlap` tokens. The final window may be shorter.
pub fn split_fixed(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let window = window.max(1);
    let overlap = overlap.min(window - 1);
    let stride = window - overlap;

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(tokens.len());
        pieces.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += stride;
    }
    pieces
}

/// Content-aware split: breakpoints where the embedding distance between
/// adjacent sentences spikes above the mean by the configured multiple
/// of the standard deviation.
async fn split_semantic(
    embedder: &dyn EmbeddingProvider,
    config: &ChunkingConfig,
    text: &str,
) -> anyhow::Result<Vec<String>> {
    let sentences = split_sentences(text);
    if sentences.len() < 3 {
        // Not enough boundaries to estimate a breakpoint distribution.
        return Ok(vec![sentences.join(" ")]);
    }

    let vectors = embedder.embed(&sentences).await?;
    if vectors.len() != sentences.len() {
        anyhow::bail!(
            "embedding count mismatch: {} sentences, {} vectors",
            sentences.len(),
            vectors.len()
        );
    }

    let distances: Vec<f64> = vectors
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]) as f64)
        .collect();

    let mean = distances.iter().sum::<f64>() / distances.len() as f64;
    let variance = distances
        .iter()
        .map(|d| (d - mean).powi(2))
        .sum::<f64>()
        / distances.len() as f64;
    let threshold = mean + config.breakpoint_std_mult * variance.sqrt();

    let mut pieces = Vec::new();
    let mut current: Vec<&str> = vec![&sentences[0]];
    for (i, dist) in distances.iter().enumerate() {
        if *dist > threshold {
            pieces.push(current.join(" "));
            current = Vec::new();
        }
        current.push(&sentences[i + 1]);
    }
    if !current.is_empty() {
        pieces.push(current.join(" "));
    }

    Ok(pieces)
}

/// Sentence segmentation on terminal punctuation and line breaks.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        match ch {
            '.' | '!' | '?' | '。' | '！' | '？' | '\n' => {
                if ch != '\n' {
                    current.push(ch);
                }
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}
