//! # ragforge
//!
//! A retrieval-augmented generation service: hierarchical tree
//! indexing, hybrid retrieval, enhancer stages (query rewriting, HyDE,
//! reranking, repacking), and Ragas-style evaluation over a pluggable
//! vector store and LLM provider.
//!
//! ## Modules
//!
//! - [`ragforge::config`] — TOML configuration parsing and validation
//! - [`ragforge::indexer`] — download/extract/walk/chunk/embed/insert pipeline
//! - [`ragforge::treebuilder`] / [`ragforge::pathfinder`] / [`ragforge::treeretriever`] — hierarchical tree indexing and retrieval
//! - [`ragforge::retriever`] — flat single-stage vector search
//! - [`ragforge::enhancer`] — query rewriting, HyDE, reranking, repacking
//! - [`ragforge::generator`] — prompt assembly and answer generation
//! - [`ragforge::evaluator`] — Ragas-style faithfulness/relevancy/precision/recall metrics
//! - [`ragforge::service`] — `RagService`, the orchestrator wiring everything together
//! - [`ragforge::server`] — Axum HTTP surface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ragforge::config;
use ragforge::enhancer::EnhancerOptions;
use ragforge::server;
use ragforge::service::RagService;

#[derive(Parser)]
#[command(
    name = "ragforge",
    about = "ragforge — retrieval-augmented generation over a pluggable vector store and LLM provider",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/ragforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Index a URL (direct file or ZIP archive)
    IndexUrl {
        /// URL to download and index
        url: String,

        /// Directory to download into before indexing
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Index an already-on-disk directory
    IndexDirectory {
        /// Directory to walk and index
        directory: PathBuf,
    },

    /// Run a single query against the index
    Query {
        /// Question to ask
        question: String,

        /// Restrict retrieval to this document id
        #[arg(long)]
        document_id: Option<String>,

        /// Rewrite the query before embedding it
        #[arg(long)]
        rewrite: bool,

        /// Use HyDE (hypothetical document embeddings)
        #[arg(long)]
        hyde: bool,

        /// Rerank retrieved results before generation
        #[arg(long)]
        rerank: bool,
    },

    /// Run a query and evaluate the resulting answer
    Evaluate {
        /// Question to ask
        question: String,

        /// Optional ground-truth answer to score context recall against
        #[arg(long)]
        ground_truth: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ragforge::logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let bind = cfg.server.bind.clone();
            let query_timeout_secs = cfg.server.query_timeout_secs;
            let service = RagService::new(cfg)?;
            server::run_server(service, &bind, query_timeout_secs).await?;
        }
        Commands::IndexUrl { url, data_dir } => {
            let service = RagService::new(cfg)?;
            let report = service.index_url(&url, &data_dir).await?;
            println!(
                "indexed {} file(s), {} failed, {} chunk(s) written",
                report.files_indexed, report.files_failed, report.chunks_written
            );
        }
        Commands::IndexDirectory { directory } => {
            let service = RagService::new(cfg)?;
            let report = service.index_directory(&directory).await?;
            println!(
                "indexed {} file(s), {} failed, {} chunk(s) written",
                report.files_indexed, report.files_failed, report.chunks_written
            );
        }
        Commands::Query { question, document_id, rewrite, hyde, rerank } => {
            let service = RagService::new(cfg)?;
            let options = EnhancerOptions { rewrite, hyde, rerank, ..EnhancerOptions::default() };
            let result = service.query(&question, document_id.as_deref(), options).await?;
            println!("{}", result.answer);
            for source in &result.sources {
                println!("  - {} ({})", source.document_name, source.section);
            }
        }
        Commands::Evaluate { question, ground_truth } => {
            let service = RagService::new(cfg)?;
            let (result, evaluation) = service.query_and_evaluate(&question, ground_truth).await?;
            println!("{}", result.answer);
            println!(
                "faithfulness={:.2} relevancy={:.2} precision={:.2} recall={:?} overall={:.2}",
                evaluation.faithfulness,
                evaluation.answer_relevancy,
                evaluation.context_precision,
                evaluation.context_recall,
                evaluation.overall_score
            );
        }
    }

    Ok(())
}
