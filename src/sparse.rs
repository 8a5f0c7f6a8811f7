//! In-memory lexical index over document chunks.
//!
//! BM25 ranking (k1 = 1.2, b = 0.75) keyed by chunk identity. The index
//! is rebuilt from the chunk store at every process start and is never
//! persisted; `add` is idempotent per key so re-ingestion cannot double
//! count.

use std::collections::{HashMap, HashSet};

const K1: f64 = 1.2;
const B: f64 = 0.75;

struct IndexedChunk {
    key: String,
    term_freq: HashMap<String, u32>,
    length: usize,
}

#[derive(Default)]
pub struct LexicalIndex {
    chunks: Vec<IndexedChunk>,
    by_key: HashMap<String, usize>,
    doc_freq: HashMap<String, u32>,
    total_tokens: usize,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index one chunk under its identity key. Re-adding a known key is
    /// a no-op.
    pub fn add(&mut self, key: &str, text: &str) {
        if self.by_key.contains_key(key) {
            return;
        }

        let tokens = tokenize(text);
        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }

        self.total_tokens += tokens.len();
        self.by_key.insert(key.to_string(), self.chunks.len());
        self.chunks.push(IndexedChunk {
            key: key.to_string(),
            term_freq,
            length: tokens.len(),
        });
    }

    /// Rank all chunks against the query, best first. Zero-score chunks
    /// are omitted.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }

        let avg_len = self.total_tokens as f64 / self.chunks.len() as f64;
        // Dedup query terms so a repeated word does not double a score.
        let unique_terms: HashSet<&String> = query_terms.iter().collect();

        let mut scored: Vec<(String, f64)> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = self.score_chunk(chunk, &unique_terms, avg_len);
                if score > 0.0 {
                    Some((chunk.key.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    fn score_chunk(&self, chunk: &IndexedChunk, terms: &HashSet<&String>, avg_len: f64) -> f64 {
        let mut score = 0.0;
        for term in terms {
            let tf = chunk.term_freq.get(*term).copied().unwrap_or(0) as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(term);
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * (chunk.length as f64 / avg_len));
            score += idf * (numerator / denominator);
        }
        score
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        if df == 0.0 {
            return 0.0;
        }
        let n = self.chunks.len() as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
