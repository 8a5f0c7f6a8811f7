//! Hybrid retrieval: dense + sparse candidates, RRF fusion,
//! cross-encoder reranking, similarity filtering.
//!
//! The whole pipeline runs inside one fallible function; any stage
//! failure surfaces to the caller as a structured error payload rather
//! than an `Err` or partial output.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, embed_query};
use crate::index::{IndexHandle, StoredChunk};
use crate::models::SplitMethod;
use crate::rerank::Reranker;

/// RRF constant: fused score contribution is `1 / (RRF_C + rank)`.
pub const RRF_C: f64 = 60.0;

#[derive(Debug, Clone, Serialize)]
pub struct HitMetadata {
    /// File name of the chunk's source document.
    pub source: String,
    /// Chunk index within the source document.
    pub idx: usize,
    pub split_method: SplitMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub text: String,
    pub metadata: HitMetadata,
}

/// Structured outcome handed to the orchestration layer: either ranked
/// hits or a single error payload, never partial output.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RetrievalResponse {
    Results { results: Vec<RetrievalHit> },
    Error { error: String },
}

/// Per-query working state; rebuilt fresh on every call.
struct RetrievalCandidate {
    stored: StoredChunk,
    #[allow(dead_code)]
    dense_rank: Option<usize>,
    #[allow(dead_code)]
    sparse_rank: Option<usize>,
    #[allow(dead_code)]
    fused_score: f64,
    rerank_score: Option<f64>,
}

/// Answer `query` with at most `top_k` chunks from the index.
pub async fn retrieve(
    handle: &IndexHandle,
    reranker: &dyn Reranker,
    config: &RetrievalConfig,
    query: &str,
    top_k: usize,
) -> RetrievalResponse {
    match try_retrieve(handle, reranker, config, query, top_k).await {
        Ok(results) => RetrievalResponse::Results { results },
        Err(e) => {
            warn!(error = %e, "retrieval failed");
            RetrievalResponse::Error {
                error: e.to_string(),
            }
        }
    }
}

async fn try_retrieve(
    handle: &IndexHandle,
    reranker: &dyn Reranker,
    config: &RetrievalConfig,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievalHit>> {
    let top_k = top_k.max(1);
    let query_vec = embed_query(handle.embedder(), query).await?;

    // Stage 1: dense candidates, best similarity first.
    let dense = handle
        .dense_search(&query_vec, config.candidate_k_dense.max(top_k))
        .await?;

    // Stage 2: sparse candidates.
    let sparse = handle
        .sparse_search(query, config.candidate_k_sparse.max(top_k))
        .await;

    debug!(
        dense = dense.len(),
        sparse = sparse.len(),
        "candidates collected"
    );

    // Stage 3: reciprocal rank fusion over the two ranked key lists.
    let dense_keys: Vec<String> = dense.iter().map(|(c, _)| c.key.clone()).collect();
    let sparse_keys: Vec<String> = sparse.iter().map(|(key, _)| key.clone()).collect();
    let fused = rrf_fuse(&dense_keys, &sparse_keys, config.fuse_depth);

    // Resolve chunk payloads: dense hits already carry them, sparse-only
    // keys are fetched from the store.
    let mut by_key: HashMap<String, StoredChunk> =
        dense.into_iter().map(|(c, _)| (c.key.clone(), c)).collect();
    let missing: Vec<String> = fused
        .iter()
        .filter(|(key, _)| !by_key.contains_key(key))
        .map(|(key, _)| key.clone())
        .collect();
    by_key.extend(handle.chunks_by_keys(&missing).await?);

    let dense_rank_of: HashMap<&str, usize> = dense_keys
        .iter()
        .enumerate()
        .map(|(i, k)| (k.as_str(), i + 1))
        .collect();
    let sparse_rank_of: HashMap<&str, usize> = sparse_keys
        .iter()
        .enumerate()
        .map(|(i, k)| (k.as_str(), i + 1))
        .collect();

    let mut candidates: Vec<RetrievalCandidate> = fused
        .into_iter()
        .filter_map(|(key, fused_score)| {
            let stored = by_key.remove(&key)?;
            Some(RetrievalCandidate {
                dense_rank: dense_rank_of.get(key.as_str()).copied(),
                sparse_rank: sparse_rank_of.get(key.as_str()).copied(),
                stored,
                fused_score,
                rerank_score: None,
            })
        })
        .collect();

    // Stage 4: cross-encoder rerank of the fused top set; the fused
    // score is discarded from here on.
    candidates.truncate(config.rerank_depth);
    let passages: Vec<String> = candidates
        .iter()
        .map(|c| c.stored.chunk.content.clone())
        .collect();
    let scores = reranker.score(query, &passages).await?;
    for (candidate, score) in candidates.iter_mut().zip(scores.iter()) {
        candidate.rerank_score = Some(*score);
    }
    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Stage 5: query-similarity floor (boundary inclusive), then top_k.
    candidates.retain(|c| {
        cosine_similarity(&query_vec, &c.stored.embedding) as f64 >= config.similarity_floor
    });
    candidates.truncate(top_k);

    Ok(candidates
        .into_iter()
        .map(|c| {
            let file_name = std::path::Path::new(&c.stored.chunk.source_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| c.stored.chunk.source_path.clone());
            RetrievalHit {
                text: c.stored.chunk.content,
                metadata: HitMetadata {
                    source: file_name,
                    idx: c.stored.chunk.index,
                    split_method: c.stored.chunk.split_method,
                },
            }
        })
        .collect())
}

/// Reciprocal rank fusion over ranked key lists.
///
/// Each list is truncated to `fuse_depth` before scoring. A key scores
/// `Σ 1/(c + rank)` across the lists it appears in, with 1-based ranks
/// and `c = 60`. Ties break by first-seen order, the dense list scanned
/// before the sparse list.
pub fn rrf_fuse(dense: &[String], sparse: &[String], fuse_depth: usize) -> Vec<(String, f64)> {
    struct Fused {
        score: f64,
        first_seen: usize,
    }

    let mut scores: HashMap<&str, Fused> = HashMap::new();
    let mut order = 0usize;

    for list in [dense, sparse] {
        for (rank0, key) in list.iter().take(fuse_depth).enumerate() {
            let contribution = 1.0 / (RRF_C + (rank0 + 1) as f64);
            scores
                .entry(key.as_str())
                .and_modify(|f| f.score += contribution)
                .or_insert_with(|| {
                    let f = Fused {
                        score: contribution,
                        first_seen: order,
                    };
                    order += 1;
                    f
                });
        }
    }

    let mut fused: Vec<(String, Fused)> = scores
        .into_iter()
        .map(|(key, f)| (key.to_string(), f))
        .collect();
    fused.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });

    fused.into_iter().map(|(key, f)| (key, f.score)).collect()
}
