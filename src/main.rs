//! # Voxpop CLI (`vox`)
//!
//! Operational shell around the harvesting and retrieval subsystems.
//!
//! ```bash
//! vox --config ./config/vox.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vox init` | Create the index database and run schema migrations |
//! | `vox ingest` | Chunk, embed, and index the corpus (idempotent) |
//! | `vox search "<query>"` | Hybrid retrieval over the indexed corpus |
//! | `vox harvest` | Collect opinion factors from configured targets |
//! | `vox sources` | Show configured targets and adapter status |

mod budget;
mod chunk;
mod config;
mod db;
mod embedding;
mod harvest;
mod index;
mod migrate;
mod models;
mod normalize;
mod rerank;
mod retrieve;
mod source;
#[allow(dead_code)]
mod source_board;
mod source_forum;
mod sparse;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::harvest::Harvester;
use crate::index::IndexHandle;
use crate::models::{SourceKind, Target};
use crate::source_forum::{ForumAdapter, HttpForumApi};

/// Voxpop — budget-bounded opinion harvesting and hybrid corpus
/// retrieval for advisory agents.
#[derive(Parser)]
#[command(
    name = "vox",
    about = "Voxpop — budget-bounded opinion harvesting and hybrid corpus retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema. Idempotent.
    Init,

    /// Ingest the corpus directory into the dense and sparse indexes.
    ///
    /// A durable flag makes this a no-op after the first successful
    /// run; pass `--reset` to clear the flag and re-ingest.
    Ingest {
        /// Clear the ingestion flag before ingesting.
        #[arg(long)]
        reset: bool,
    },

    /// Retrieve corpus chunks for a query (dense + sparse + rerank).
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Harvest opinion factors from the configured targets.
    Harvest {
        /// Write one JSON artifact per target instead of printing the
        /// aggregate.
        #[arg(long)]
        save: bool,
    },

    /// Show configured targets and adapter status.
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.index).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized");
        }

        Commands::Ingest { reset } => {
            let embedder = embedding::create_provider(&config.embedding)?;
            let handle = IndexHandle::open(&config, embedder).await?;
            if reset {
                handle.clear_ingestion_flag()?;
            }
            handle.ensure_index(&config.index.corpus_dir).await?;
            println!("ingest");
            println!("  chunks indexed: {}", handle.chunk_count().await?);
            println!("ok");
        }

        Commands::Search { query, top_k } => {
            let embedder = embedding::create_provider(&config.embedding)?;
            let handle = IndexHandle::open(&config, embedder).await?;
            handle.ensure_index(&config.index.corpus_dir).await?;
            let reranker = rerank::create_reranker(&config.reranker)?;
            let top_k = top_k.unwrap_or(config.retrieval.top_k);

            let response = retrieve::retrieve(
                &handle,
                reranker.as_ref(),
                &config.retrieval,
                &query,
                top_k,
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Harvest { save } => {
            let mut harvest_config = config.harvest.clone();
            if save {
                harvest_config.return_factor = false;
            }

            let mut harvester = Harvester::new(harvest_config);
            let mut targets: Vec<Target> = Vec::new();

            if let Some(forum) = &config.sources.forum {
                let api = Arc::new(HttpForumApi::new(&forum.base_url)?);
                harvester.register(Box::new(ForumAdapter::new(api, &config.harvest)));
                targets.extend(
                    forum
                        .targets
                        .iter()
                        .map(|id| Target::new(SourceKind::Forum, id)),
                );
            }

            // The link-aggregator needs a pre-authenticated client from
            // the host application; its targets still go into the run so
            // the report carries a warning instead of silence.
            if let Some(aggregator) = &config.sources.aggregator {
                targets.extend(
                    aggregator
                        .targets
                        .iter()
                        .map(|id| Target::new(SourceKind::Aggregator, id)),
                );
            }

            let report = harvester.harvest(&targets).await;
            println!("harvest");
            println!("  items: {}", report.items.len());
            println!("  warnings: {}", report.warnings.len());
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            if !report.items.is_empty() {
                println!("{}", serde_json::to_string_pretty(&report.items)?);
            }
            println!("ok");
        }

        Commands::Sources => {
            let forum_status = match &config.sources.forum {
                Some(forum) => format!("OK ({} targets)", forum.targets.len()),
                None => "NOT CONFIGURED".to_string(),
            };
            let aggregator_status = match &config.sources.aggregator {
                Some(aggregator) => {
                    format!("CONFIGURED ({} targets, client required)", aggregator.targets.len())
                }
                None => "NOT CONFIGURED".to_string(),
            };

            println!("{:<16} {}", "SOURCE", "STATUS");
            println!("{:<16} {}", "forum", forum_status);
            println!("{:<16} {}", "aggregator", aggregator_status);
        }
    }

    Ok(())
}
