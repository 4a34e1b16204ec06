//! Storage abstraction layer for vault-ai-retriever
//!
//! This module defines the persisted record types and the [`VectorStore`]
//! trait the indexing pipeline and the context assembler work against. It
//! separates the storage concerns from the retrieval logic so that the
//! pipeline can be tested against any backend.
//!
//! ## Key Components
//!
//! - **VectorStore**: point lookup, full-replace upsert, nearest-neighbor query
//! - **VectorCollection**: a store paired with an embedding gateway, accepting text
//! - **SqliteVectorStore**: the persistent SQLite implementation
//! - **Data Types**: [`IndexRecord`], [`RecordMetadata`], [`QueryResult`]
//!
//! ## Architecture
//!
//! ```text
//! EmbeddingGateway ─┐
//!                   ├─ VectorCollection ── IndexingPipeline / ContextAssembler
//! VectorStore ──────┘
//!      └── SqliteVectorStore (concrete implementation)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod collection;
pub mod sqlite_store;

pub use collection::{CollectionError, VectorCollection};

/// How a note's embedded text was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// Only the summary section of an archived conversation
    ConversationSummary,
    /// The whole note, verbatim
    FullNote,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::ConversationSummary => "conversation_summary",
            SourceCategory::FullNote => "full_note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "conversation_summary" => Some(SourceCategory::ConversationSummary),
            "full_note" => Some(SourceCategory::FullNote),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_category: SourceCategory,
    /// File modification time as of the scan that wrote the record
    pub modified_at: DateTime<Utc>,
    pub full_path: PathBuf,
}

/// A persisted note: the text that was embedded, its vector and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Absolute path of the note, the natural key
    pub id: String,
    pub embedded_text: String,
    pub embedding: Vec<f16>,
    pub metadata: RecordMetadata,
}

/// One nearest-neighbor match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub document: String,
    pub metadata: RecordMetadata,
    /// Non-negative dissimilarity, 0 means identical
    pub distance: f32,
}

/// Dissimilarity used for nearest-neighbor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// One minus cosine similarity, clamped at zero
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "l2" => Some(DistanceMetric::L2),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }

    /// Distance between two equal-length vectors.
    pub fn distance(&self, a: &[f16], b: &[f16]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x.to_f32() - y.to_f32();
                    d * d
                })
                .sum(),
            DistanceMetric::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b) {
                    let (x, y) = (x.to_f32(), y.to_f32());
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
                }
            }
        }
    }
}

/// Record counts for one collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub collection: String,
    pub metric: String,
    pub total_records: usize,
    pub conversation_summaries: usize,
    pub full_notes: usize,
    /// Distinct vector widths present; more than one means mixed models
    pub dimensions: Vec<usize>,
    pub newest_modified_at: Option<DateTime<Utc>>,
}

/// Persistent vector storage keyed by document id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Look up a record by id
    async fn get(&self, id: &str) -> Result<Option<IndexRecord>>;

    /// Insert or fully replace the record with `record.id`
    async fn upsert(&self, record: IndexRecord) -> Result<()>;

    /// The `k` records nearest to `embedding`, ascending by distance
    async fn query_nearest(&self, embedding: &[f16], k: usize) -> Result<Vec<QueryResult>>;

    /// Summary counts for diagnostics
    async fn stats(&self) -> Result<StoreStats>;
}
