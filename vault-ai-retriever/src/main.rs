use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vault_ai_embed::{EmbeddingGateway, create_provider};
use vault_ai_retriever::{
    config::VaultConfig,
    retrieval::{
        context::ContextAssembler,
        extractor::DocumentExtractor,
        pipeline::IndexingPipeline,
        scanner::{self, VaultScanner},
    },
    storage::{VectorCollection, VectorStore, sqlite_store::SqliteVectorStore},
};

/// Index a notes vault and retrieve context from it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vault root containing the .vault-ai.db database file
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Database file, overriding the location inside the vault root
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index new and modified notes
    Index {
        /// Vault root, overriding --root and the configured one
        root: Option<PathBuf>,
    },
    /// Retrieve context for a query
    Context {
        query: String,
        /// Maximum number of notes
        #[arg(short)]
        k: Option<usize>,
        /// Keep notes strictly closer than this distance
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: ContextFormat,
    },
    /// Show the record stored for a note
    Get {
        /// Note path
        id: String,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show database statistics
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ContextFormat {
    /// The rendered context block
    Text,
    Json,
    /// The full user message with the query and context
    Message,
}

impl std::str::FromStr for ContextFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContextFormat::Text),
            "json" => Ok(ContextFormat::Json),
            "message" => Ok(ContextFormat::Message),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The vault root: an explicit override, then `--root`, then the config file.
fn vault_root(args: &Args, config: &VaultConfig, explicit: Option<&PathBuf>) -> PathBuf {
    explicit
        .or(args.root.as_ref())
        .cloned()
        .unwrap_or_else(|| config.vault_root())
}

fn database_path(args: &Args, config: &VaultConfig, root: &Path) -> PathBuf {
    args.db.clone().unwrap_or_else(|| config.database_path(root))
}

/// Opens the index for reading; a missing index is an error, never created.
async fn open_index(args: &Args, config: &VaultConfig) -> anyhow::Result<SqliteVectorStore> {
    let db_path = database_path(args, config, &vault_root(args, config, None));
    SqliteVectorStore::open_existing(&db_path, &config.store.collection).await
}

async fn with_gateway(
    config: &VaultConfig,
    store: &SqliteVectorStore,
) -> anyhow::Result<VectorCollection> {
    let provider = create_provider(&config.embedding)
        .await
        .context("Failed to create embedding provider")?;
    Ok(VectorCollection::new(Arc::new(store.clone()), EmbeddingGateway::new(provider)))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = VaultConfig::load_or_default(args.config.as_deref())?;

    match &args.command {
        Commands::Index { root } => {
            let root = vault_root(&args, &config, root.as_ref());
            let outcome = index(&args, &config, &root).await;
            match outcome {
                Ok(report) => {
                    println!("{report}");
                    println!("Indexing completed, {} files updated", report.upserts());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Indexing aborted: {e:#}");
                    process::exit(1);
                }
            }
        }
        Commands::Context {
            query,
            k,
            threshold,
            format,
        } => {
            let store = open_index(&args, &config).await?;
            let collection = with_gateway(&config, &store).await?;
            let assembler = ContextAssembler::new(collection)
                .with_k(k.unwrap_or(config.retrieval.k))
                .with_distance_threshold(threshold.unwrap_or(config.retrieval.distance_threshold));
            let block = assembler.retrieve(query).await?;

            match format {
                ContextFormat::Json => println!("{}", serde_json::to_string_pretty(&block)?),
                ContextFormat::Text => {
                    if block.is_empty() {
                        eprintln!("No relevant notes found");
                    } else {
                        print!("{}", block.render());
                    }
                }
                ContextFormat::Message => print!("{}", block.user_message(query)),
            }
            store.close().await;
            Ok(())
        }
        Commands::Get { id, format } => {
            let store = open_index(&args, &config).await?;
            // Accept relative paths to notes that exist
            let id = Path::new(id)
                .canonicalize()
                .map(|path| scanner::document_id(&path))
                .unwrap_or_else(|_| id.clone());

            match store.get(&id).await? {
                Some(record) => match format {
                    OutputFormat::Json => {
                        let output = serde_json::json!({
                            "id": record.id,
                            "embedded_text": record.embedded_text,
                            "metadata": record.metadata,
                            "dimension": record.embedding.len(),
                        });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Summary => {
                        println!("ID: {}", record.id);
                        println!("Category: {}", record.metadata.source_category);
                        println!("Modified: {}", record.metadata.modified_at.to_rfc3339());
                        println!("Dimension: {}", record.embedding.len());
                        println!(
                            "Content preview: {}",
                            record.embedded_text.chars().take(100).collect::<String>()
                        );
                    }
                },
                None => println!("No record with id {id}"),
            }
            store.close().await;
            Ok(())
        }
        Commands::Stats => {
            let store = open_index(&args, &config).await?;
            let stats = store.stats().await?;

            println!("Database Statistics:");
            println!("  Collection: {} ({})", stats.collection, stats.metric);
            println!("  Total records: {}", stats.total_records);
            println!("  Conversation summaries: {}", stats.conversation_summaries);
            println!("  Full notes: {}", stats.full_notes);
            if !stats.dimensions.is_empty() {
                let dims: Vec<String> = stats.dimensions.iter().map(|d| d.to_string()).collect();
                println!("  Dimensions: {}", dims.join(", "));
            }
            if let Some(newest) = stats.newest_modified_at {
                println!("  Newest note: {}", newest.to_rfc3339());
            }
            store.close().await;
            Ok(())
        }
    }
}

async fn index(
    args: &Args,
    config: &VaultConfig,
    root: &Path,
) -> anyhow::Result<vault_ai_retriever::retrieval::pipeline::IndexingReport> {
    let root = scanner::resolve_root(root)?;
    let store = SqliteVectorStore::open(
        &database_path(args, config, &root),
        &config.store.collection,
        config.store.metric,
    )
    .await?;
    let collection = with_gateway(config, &store).await?;

    let scanner = VaultScanner::new(collection.store().clone())
        .with_extension(&config.vault.extension)
        .with_skip_hidden(config.vault.skip_hidden);
    let pipeline = IndexingPipeline::new(collection)
        .with_scanner(scanner)
        .with_extractor(DocumentExtractor::with_conversation_rule(config.conversation_rule()));

    let report = pipeline.run(&root).await;
    store.close().await;
    report
}
