use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kb_core::{
    ChunkingConfig, CollectionConfig, DocumentIndexer, EmbeddingProvider, IndexingConfig,
    IndexingResult, RetrievalConfig, Retriever, SearchResult, VectorStore, cosine_similarity,
};
use kb_dashscope::DashScopeEmbedder;
use kb_milvus::MilvusVectorStore;
use kb_rag::{DocumentChunker, QdrantVectorStore, VectorIndexer, VectorRetriever};

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Index documents into a vector store and search them", long_about = None)]
struct Cli {
    /// Vector store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Milvus, global = true)]
    store: StoreKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Milvus,
    Qdrant,
}

#[derive(Subcommand)]
enum Commands {
    /// Index (or re-index) a single document
    Index { file: PathBuf },
    /// Index every eligible document in a directory
    IndexDir {
        /// Defaults to UPLOAD_PATH
        dir: Option<PathBuf>,
    },
    /// Search the knowledge base
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cosine similarity between two texts
    Similarity { a: String, b: String },
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// Create the configured collection if it does not exist
    Init,
    /// Drop the configured collection
    Drop,
    /// List collections
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let success = match cli.store {
        StoreKind::Milvus => run(cli.command, Arc::new(MilvusVectorStore::from_env()?)).await?,
        StoreKind::Qdrant => run(cli.command, Arc::new(QdrantVectorStore::from_env()?)).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run<V: VectorStore + 'static>(command: Commands, store: Arc<V>) -> Result<bool> {
    let collection = CollectionConfig::from_env()?;
    debug!(backend = store.backend(), collection = %collection.name, "vector store selected");

    match command {
        Commands::Index { file } => {
            let indexer = build_indexer(store, collection)?;
            let report = indexer.index_document(&file).await?;
            println!(
                "{} Indexed {} ({} chunks, {} stale records removed)",
                "✅".green(),
                report.source.bold(),
                report.chunks,
                report.deleted
            );
        }
        Commands::IndexDir { dir } => {
            let indexer = build_indexer(store, collection)?;
            let result = indexer.index_directory(dir.as_deref()).await?;
            print_indexing_result(&result);
            return Ok(result.success);
        }
        Commands::Search { query, top_k, json } => {
            let embedder = Arc::new(DashScopeEmbedder::from_env()?);
            let config = RetrievalConfig::from_env()?;
            let top_k = top_k.unwrap_or(config.top_k);
            let retriever = VectorRetriever::new(embedder, store, collection, config);

            let results = retriever.search(&query, top_k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::Similarity { a, b } => {
            let embedder = DashScopeEmbedder::from_env()?;
            let vectors = embedder.embed_batch(&[a, b]).await?;
            let [left, right] = vectors.as_slice() else {
                anyhow::bail!("expected two embeddings, got {}", vectors.len());
            };
            println!("{:.4}", cosine_similarity(left, right)?);
        }
        Commands::Collection { action } => match action {
            CollectionAction::Init => {
                if store.ensure_collection(&collection).await? {
                    println!("{} Created collection {}", "✅".green(), collection.name.bold());
                } else {
                    println!("{} Collection {} already exists", "ℹ️".blue(), collection.name.bold());
                }
            }
            CollectionAction::Drop => {
                if store.drop_collection(&collection.name).await? {
                    println!("{} Dropped collection {}", "🗑️".yellow(), collection.name.bold());
                } else {
                    println!("{} Collection {} does not exist", "ℹ️".blue(), collection.name.bold());
                }
            }
            CollectionAction::List => {
                let names = store.list_collections().await?;
                println!("{} ({})", "Collections".bold(), store.backend());
                for name in names {
                    println!("  {} {}", "•".cyan(), name);
                }
            }
        },
    }

    Ok(true)
}

fn build_indexer<V: VectorStore + 'static>(
    store: Arc<V>,
    collection: CollectionConfig,
) -> Result<VectorIndexer<DashScopeEmbedder, V>> {
    let embedder = Arc::new(DashScopeEmbedder::from_env().context("embedding provider")?);
    let chunker = DocumentChunker::new(ChunkingConfig::from_env()?);
    let config = IndexingConfig::from_env()?;
    Ok(VectorIndexer::new(embedder, store, chunker, collection, config))
}

fn print_indexing_result(result: &IndexingResult) {
    let status = if result.success {
        "✅".green()
    } else {
        "⚠️".yellow()
    };
    println!(
        "{} {}: {}/{} files indexed in {}ms",
        status,
        result.directory.bold(),
        result.success_count,
        result.total_files,
        result.duration_ms()
    );
    for (path, error) in &result.failed_files {
        println!("  {} {}: {}", "❌".red(), path, error);
    }
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("{}", "No matching documents".yellow());
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let title = result
            .metadata
            .get("title")
            .and_then(|t| t.as_str())
            .or_else(|| result.metadata.get("_file_name").and_then(|f| f.as_str()))
            .unwrap_or("untitled");
        println!(
            "{} {} {}",
            format!("{}.", i + 1).bold(),
            title.cyan(),
            format!("(score {:.4})", result.score).dimmed()
        );
        println!("{}\n", result.content);
    }
}
