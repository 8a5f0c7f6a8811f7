//! Explicit handle over the dense/sparse index pair.
//!
//! [`IndexHandle`] is constructed once at startup and passed by
//! reference into ingestion and retrieval — no process-wide lazy
//! statics. It owns the SQLite pool backing the dense index, the
//! in-memory lexical index (rebuilt from the chunk table on every
//! open, never persisted), and the embedding provider.
//!
//! Ingestion is gated by a durable `.ingested` flag file in the index
//! directory: while the flag is present `ensure_index` is a no-op.
//! Concurrent `ensure_index` calls from separate processes before the
//! flag exists can still double-ingest; the identity key's UNIQUE
//! constraint keeps the stored chunk set deduplicated regardless.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::db;
use crate::embedding::{
    blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider,
};
use crate::migrate;
use crate::models::{DocumentChunk, SplitMethod};
use crate::sparse::LexicalIndex;

const INGESTED_FLAG: &str = ".ingested";

/// A chunk as loaded from the dense index, with its embedding.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub key: String,
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

pub struct IndexHandle {
    pool: SqlitePool,
    sparse: RwLock<LexicalIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: Config,
}

impl IndexHandle {
    /// Connect, migrate, and rebuild the in-memory lexical index from
    /// the stored chunk set.
    pub async fn open(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let pool = db::connect(&config.index).await?;
        migrate::run_migrations(&pool).await?;

        let mut sparse = LexicalIndex::new();
        let rows = sqlx::query("SELECT chunk_key, content FROM chunks")
            .fetch_all(&pool)
            .await?;
        for row in &rows {
            let key: String = row.get("chunk_key");
            let content: String = row.get("content");
            sparse.add(&key, &content);
        }
        debug!(chunks = sparse.len(), "lexical index rebuilt");

        Ok(Self {
            pool,
            sparse: RwLock::new(sparse),
            embedder,
            config: config.clone(),
        })
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    fn flag_path(&self) -> PathBuf {
        self.config.index.dir.join(INGESTED_FLAG)
    }

    pub fn is_ingested(&self) -> bool {
        self.flag_path().exists()
    }

    /// Explicit reset: the next `ensure_index` call re-ingests.
    pub fn clear_ingestion_flag(&self) -> Result<()> {
        let path = self.flag_path();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove flag: {}", path.display()))?;
        }
        Ok(())
    }

    /// Ingest the corpus once: walk, chunk, embed, store.
    ///
    /// Per-file read failures are skipped with a warning and do not
    /// abort the walk; embedding backend failures do, leaving the flag
    /// unset. A missing corpus directory also leaves the flag unset so a
    /// later run can pick the corpus up.
    pub async fn ensure_index(&self, corpus_dir: &Path) -> Result<()> {
        if self.is_ingested() {
            debug!("ingestion flag present, skipping corpus ingestion");
            return Ok(());
        }
        if !corpus_dir.is_dir() {
            warn!(corpus = %corpus_dir.display(), "corpus directory missing, nothing to ingest");
            return Ok(());
        }

        let include = build_globset(&self.config.index.include_globs)?;
        let exclude = build_globset(&self.config.index.exclude_globs)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(corpus_dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable corpus entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(corpus_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            if exclude.is_match(&relative) || !include.is_match(&relative) {
                continue;
            }
            files.push((entry.path().to_path_buf(), relative));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let mut files_ingested = 0usize;
        let mut files_skipped = 0usize;
        let mut chunks_written = 0usize;

        for (path, relative) in &files {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %relative, error = %e, "skipping unreadable corpus file");
                    files_skipped += 1;
                    continue;
                }
            };

            let chunks =
                chunk_document(self.embedder.as_ref(), &self.config.chunking, relative, &text)
                    .await;
            if chunks.is_empty() {
                continue;
            }

            chunks_written += self.insert_chunks(&chunks).await?;
            files_ingested += 1;
        }

        std::fs::write(self.flag_path(), b"")
            .with_context(|| "Failed to write ingestion flag")?;

        info!(
            files = files_ingested,
            skipped = files_skipped,
            chunks = chunks_written,
            "corpus ingested"
        );
        Ok(())
    }

    /// Embed and store chunks, deduplicating on the identity key.
    /// Returns how many chunks were actually inserted.
    async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let mut inserted = 0usize;

        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                let key = chunk.key();

                let existing: Option<String> =
                    sqlx::query_scalar("SELECT id FROM chunks WHERE chunk_key = ?")
                        .bind(&key)
                        .fetch_optional(&self.pool)
                        .await?;
                if existing.is_some() {
                    continue;
                }

                let id = Uuid::new_v4().to_string();
                let now = chrono::Utc::now().timestamp();

                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO chunks
                        (id, chunk_key, source_path, chunk_index, content, content_prefix, split_method, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&key)
                .bind(&chunk.source_path)
                .bind(chunk.index as i64)
                .bind(&chunk.content)
                .bind(chunk.content_prefix())
                .bind(chunk.split_method.as_str())
                .bind(now)
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "INSERT OR REPLACE INTO chunk_vectors (chunk_id, embedding, model, dims) VALUES (?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(vec_to_blob(vector))
                .bind(self.embedder.model_name())
                .bind(self.embedder.dims() as i64)
                .execute(&self.pool)
                .await?;

                self.sparse.write().await.add(&key, &chunk.content);
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    /// Brute-force cosine ranking over every stored vector, best first.
    pub async fn dense_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<(StoredChunk, f32)>> {
        let mut hits: Vec<(StoredChunk, f32)> = self
            .load_chunks(None)
            .await?
            .into_iter()
            .map(|stored| {
                let similarity = cosine_similarity(query_vec, &stored.embedding);
                (stored, similarity)
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Lexical BM25 ranking over the in-memory index.
    pub async fn sparse_search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        self.sparse.read().await.search(query, limit)
    }

    /// Resolve stored chunks for a set of identity keys.
    pub async fn chunks_by_keys(&self, keys: &[String]) -> Result<HashMap<String, StoredChunk>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let loaded = self.load_chunks(Some(keys)).await?;
        Ok(loaded
            .into_iter()
            .map(|stored| (stored.key.clone(), stored))
            .collect())
    }

    pub async fn chunk_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn load_chunks(&self, keys: Option<&[String]>) -> Result<Vec<StoredChunk>> {
        let base = r#"
            SELECT c.chunk_key, c.source_path, c.chunk_index, c.content, c.split_method, v.embedding
            FROM chunks c
            JOIN chunk_vectors v ON v.chunk_id = c.id
        "#;

        let rows = match keys {
            None => sqlx::query(base).fetch_all(&self.pool).await?,
            Some(keys) => {
                let placeholders = vec!["?"; keys.len()].join(", ");
                let sql = format!("{} WHERE c.chunk_key IN ({})", base, placeholders);
                let mut query = sqlx::query(&sql);
                for key in keys {
                    query = query.bind(key);
                }
                query.fetch_all(&self.pool).await?
            }
        };

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let method: String = row.get("split_method");
            let Some(split_method) = SplitMethod::parse(&method) else {
                warn!(split_method = %method, "unknown split method in chunk store");
                continue;
            };
            let blob: Vec<u8> = row.get("embedding");
            let chunk_index: i64 = row.get("chunk_index");

            chunks.push(StoredChunk {
                key: row.get("chunk_key"),
                chunk: DocumentChunk {
                    content: row.get("content"),
                    source_path: row.get("source_path"),
                    index: chunk_index as usize,
                    split_method,
                },
                embedding: blob_to_vec(&blob),
            });
        }

        Ok(chunks)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
