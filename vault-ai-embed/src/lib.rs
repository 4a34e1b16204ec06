//! # vault-ai-embed
//!
//! Text embedding for the vault indexer. The crate turns batches of note text
//! into vectors through pluggable providers and isolates the rest of the
//! system from provider failures.
//!
//! ## Features
//!
//! - **OpenAI-compatible endpoints**: any service speaking the `/embeddings` API
//! - **Local ONNX Models**: fastembed models, no network after the first download
//! - **Feature hashing**: deterministic offline vectors for tests and air-gapped use
//! - **Half-Precision**: f16 vectors, matching what the retriever stores
//!
//! ## Quick Start
//!
//! ```no_run
//! use vault_ai_embed::{EmbedConfig, EmbeddingGateway, create_provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = create_provider(&EmbedConfig::openai("text-embedding-3-small")).await?;
//! let gateway = EmbeddingGateway::new(provider);
//!
//! let texts = vec!["Morning pages".to_string(), "".to_string()];
//! for outcome in gateway.embed(&texts).await {
//!     match outcome.as_vector() {
//!         Some(vector) => println!("dimension {}", vector.len()),
//!         None => println!("embedding unavailable"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: provider selection and settings (the `[embedding]` TOML section)
//! - [`provider`]: the [`EmbeddingProvider`] trait and its implementations
//! - [`gateway`]: input sanitizing and failure containment
//! - [`error`]: error types and result handling
//!
//! ## Error Handling
//!
//! Providers return [`Result<T>`] with [`EmbedError`]. The
//! [`EmbeddingGateway`] never returns an error: a failed call becomes one
//! [`EmbedOutcome::Failed`] per input, logged with `tracing`.

pub mod config;
pub mod error;
pub mod gateway;
pub mod provider;

// Re-export main types for easy access
pub use config::{EmbedConfig, ProviderKind};
pub use error::{EmbedError, Result};
pub use gateway::{EmbedOutcome, EmbeddingGateway};
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, HashingProvider, OpenAiProvider,
    create_provider,
};
