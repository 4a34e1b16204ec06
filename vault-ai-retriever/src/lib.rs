//! vault-ai-retriever: incremental semantic indexing of a notes vault
//!
//! This crate keeps a vector index consistent with a folder of notes and
//! turns live queries into attributed context for a conversational
//! assistant. Notes that have not changed since the last run are never
//! re-embedded, and archived conversations are indexed by their summary
//! rather than their full transcript.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: vault scanning, hybrid extraction, the indexing pipeline and context assembly
//! - **[`storage`]**: the vector store abstraction with its SQLite implementation
//! - **[`config`]**: the TOML configuration file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vault_ai_embed::{EmbedConfig, EmbeddingGateway, create_provider};
//! use vault_ai_retriever::retrieval::{context::ContextAssembler, pipeline::IndexingPipeline};
//! use vault_ai_retriever::storage::{
//!     DistanceMetric, VectorCollection, sqlite_store::SqliteVectorStore,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteVectorStore::open(
//!     Path::new("/notes/.vault-ai.db"),
//!     "obsidian_vault_main",
//!     DistanceMetric::L2,
//! )
//! .await?;
//! let provider = create_provider(&EmbedConfig::default()).await?;
//! let collection = VectorCollection::new(Arc::new(store), EmbeddingGateway::new(provider));
//!
//! let report = IndexingPipeline::new(collection.clone())
//!     .run(Path::new("/notes"))
//!     .await?;
//! println!("{} files updated", report.upserts());
//!
//! let context = ContextAssembler::new(collection)
//!     .retrieve("what did I decide about the garden?")
//!     .await?;
//! println!("{}", context.render());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Vault → VaultScanner → DocumentExtractor → EmbeddingGateway → SqliteVectorStore
//!                                                                     ↓
//!                        Query → ContextAssembler → ContextBlock ← nearest neighbors
//! ```

pub mod config;
pub mod retrieval;
pub mod storage;
