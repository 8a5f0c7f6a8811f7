use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Durable directory holding the dense index database and the
    /// ingestion flag file.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            corpus_dir: default_corpus_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./data/corpus")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// `semantic` (embedding-distance breakpoints, falls back to fixed
    /// windows when unavailable) or `fixed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    /// Breakpoint threshold: mean + mult × std-dev of adjacent-sentence
    /// embedding distances.
    #[serde(default = "default_breakpoint_std_mult")]
    pub breakpoint_std_mult: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            window_tokens: default_window_tokens(),
            overlap_tokens: default_overlap_tokens(),
            breakpoint_std_mult: default_breakpoint_std_mult(),
        }
    }
}

fn default_strategy() -> String {
    "semantic".to_string()
}
fn default_window_tokens() -> usize {
    160
}
fn default_overlap_tokens() -> usize {
    24
}
fn default_breakpoint_std_mult() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_k_dense")]
    pub candidate_k_dense: usize,
    #[serde(default = "default_candidate_k_sparse")]
    pub candidate_k_sparse: usize,
    /// Ranked lists are truncated to this depth before RRF scoring.
    #[serde(default = "default_fuse_depth")]
    pub fuse_depth: usize,
    /// Fused candidates passed to the cross-encoder.
    #[serde(default = "default_rerank_depth")]
    pub rerank_depth: usize,
    /// Query-similarity floor; candidates at the boundary are retained.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k_dense: default_candidate_k_dense(),
            candidate_k_sparse: default_candidate_k_sparse(),
            fuse_depth: default_fuse_depth(),
            rerank_depth: default_rerank_depth(),
            similarity_floor: default_similarity_floor(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_candidate_k_dense() -> usize {
    20
}
fn default_candidate_k_sparse() -> usize {
    50
}
fn default_fuse_depth() -> usize {
    50
}
fn default_rerank_depth() -> usize {
    50
}
fn default_similarity_floor() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    /// `http` (cross-encoder scoring endpoint) or `none` (keep fused
    /// order).
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            endpoint: None,
            model: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_reranker_provider() -> String {
    "none".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    /// Wall-clock slice granted to each target.
    #[serde(default = "default_per_target_secs")]
    pub per_target_secs: u64,
    /// Per-target cap on returned items (result list is truncated).
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Run-wide item ceiling shared across all targets.
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Run-wide character ceiling shared across all targets.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_per_item_max_chars")]
    pub per_item_max_chars: usize,
    /// Courtesy delay between successive forum page fetches.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// How deep into a board's most-engaged listing to walk.
    #[serde(default = "default_listing_depth")]
    pub listing_depth: usize,
    /// Items older than this many months are excluded.
    #[serde(default = "default_recency_months")]
    pub recency_months: u32,
    /// Where per-target artifacts land when results are not returned
    /// in memory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Return items to the caller instead of writing artifacts.
    #[serde(default = "default_return_factor")]
    pub return_factor: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            per_target_secs: default_per_target_secs(),
            max_count: default_max_count(),
            max_items: default_max_items(),
            max_chars: default_max_chars(),
            per_item_max_chars: default_per_item_max_chars(),
            page_delay_ms: default_page_delay_ms(),
            listing_depth: default_listing_depth(),
            recency_months: default_recency_months(),
            output_dir: default_output_dir(),
            return_factor: default_return_factor(),
        }
    }
}

fn default_per_target_secs() -> u64 {
    5
}
fn default_max_count() -> usize {
    5
}
fn default_max_items() -> u32 {
    50
}
fn default_max_chars() -> usize {
    20_000
}
fn default_per_item_max_chars() -> usize {
    500
}
fn default_page_delay_ms() -> u64 {
    2000
}
fn default_listing_depth() -> usize {
    5
}
fn default_recency_months() -> u32 {
    3
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/factors")
}
fn default_return_factor() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub forum: Option<ForumSourceConfig>,
    pub aggregator: Option<AggregatorSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForumSourceConfig {
    /// Base URL of the comment API, e.g.
    /// `https://forum.example.com/api/v4/answers`.
    pub base_url: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorSourceConfig {
    #[serde(default)]
    pub targets: Vec<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.chunking.strategy.as_str() {
        "semantic" | "fixed" => {}
        other => anyhow::bail!("Unknown chunking strategy: '{}'. Use semantic or fixed.", other),
    }
    if config.chunking.window_tokens == 0 {
        anyhow::bail!("chunking.window_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.window_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < window_tokens");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_floor) {
        anyhow::bail!("retrieval.similarity_floor must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.reranker.provider.as_str() {
        "none" => {}
        "http" => {
            if config.reranker.endpoint.is_none() {
                anyhow::bail!("reranker.endpoint required when provider is 'http'");
            }
        }
        other => anyhow::bail!("Unknown reranker provider: '{}'. Must be none or http.", other),
    }

    if config.harvest.per_target_secs == 0 {
        anyhow::bail!("harvest.per_target_secs must be >= 1");
    }
    if config.harvest.per_item_max_chars == 0 {
        anyhow::bail!("harvest.per_item_max_chars must be > 0");
    }

    Ok(())
}
