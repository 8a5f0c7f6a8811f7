//! # Voxpop
//!
//! Budget-bounded opinion harvesting and hybrid corpus retrieval for
//! advisory agents.
//!
//! Voxpop has two side-by-side subsystems that share one data model and
//! are invoked on demand by a surrounding orchestration layer:
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │   Adapters   │──▶│  Harvester  │──▶│ HarvestReport │
//! │ Forum/Board  │   │  (budgets)  │   │ or artifacts  │
//! └──────────────┘   └─────────────┘   └───────────────┘
//!
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │    Corpus    │──▶│ IndexHandle │──▶│   Hybrid      │
//! │  (md / txt)  │   │ SQLite+BM25 │   │   Retrieval   │
//! └──────────────┘   └─────────────┘   └───────────────┘
//! ```
//!
//! Harvesting walks external discussion sources (a paginated comment
//! forum and a link-aggregator with nested comment trees) under strict
//! time/item/character budgets. Retrieval fuses dense (embedding) and
//! sparse (BM25) rankings with Reciprocal Rank Fusion, reranks with a
//! cross-encoder, and filters by query similarity.
//!
//! ## Quick Start
//!
//! ```bash
//! vox init                      # create the index database
//! vox ingest                    # chunk + embed the corpus (idempotent)
//! vox search "tuition advice"   # hybrid retrieval
//! vox harvest                   # collect opinion factors
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`budget`] | Time/item/char budget tracker |
//! | [`source`] | Source adapter capability |
//! | [`source_forum`] | Paginated comment forum adapter |
//! | [`source_board`] | Link-aggregator adapter |
//! | [`harvest`] | Target dispatch and aggregation |
//! | [`chunk`] | Semantic / fixed-window chunking |
//! | [`sparse`] | In-memory BM25 index |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Dense/sparse index handle and ingestion |
//! | [`rerank`] | Cross-encoder reranking seam |
//! | [`retrieve`] | Fusion, rerank, filter pipeline |

pub mod budget;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod harvest;
pub mod index;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod rerank;
pub mod retrieve;
pub mod source;
pub mod source_board;
pub mod source_forum;
pub mod sparse;
