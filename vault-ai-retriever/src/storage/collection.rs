//! A vector store paired with the embedding gateway.
//!
//! [`VectorCollection`] accepts text: it embeds documents on upsert and
//! queries on search, so callers never handle vectors directly.

use super::{IndexRecord, QueryResult, RecordMetadata, VectorStore};
use half::f16;
use std::sync::Arc;
use thiserror::Error;
use vault_ai_embed::{EmbedOutcome, EmbeddingGateway};

#[derive(Error, Debug)]
pub enum CollectionError {
    /// The gateway could not produce a vector; nothing was written
    #[error("Embedding unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("Refusing to store a record without an embedding")]
    EmptyEmbedding,

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Clone)]
pub struct VectorCollection {
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
}

impl std::fmt::Debug for VectorCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorCollection")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl VectorCollection {
    pub fn new(store: Arc<dyn VectorStore>, gateway: EmbeddingGateway) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    pub async fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        self.store.get(id).await.map_err(CollectionError::Store)
    }

    /// Embed `document` and insert or fully replace the record `id`.
    ///
    /// When the embedding is unavailable the existing record, if any, is left
    /// untouched.
    pub async fn upsert(&self, id: &str, document: &str, metadata: RecordMetadata) -> Result<()> {
        let embedding = match self.gateway.embed_one(document).await {
            EmbedOutcome::Embedded(vector) => vector,
            EmbedOutcome::Failed(reason) => {
                return Err(CollectionError::EmbeddingUnavailable { reason });
            }
        };
        self.upsert_embedded(id, document, embedding, metadata).await
    }

    /// Store a record whose vector was computed elsewhere.
    pub async fn upsert_embedded(
        &self,
        id: &str,
        document: &str,
        embedding: Vec<f16>,
        metadata: RecordMetadata,
    ) -> Result<()> {
        if embedding.is_empty() {
            return Err(CollectionError::EmptyEmbedding);
        }
        self.store
            .upsert(IndexRecord {
                id: id.to_string(),
                embedded_text: document.to_string(),
                embedding,
                metadata,
            })
            .await
            .map_err(CollectionError::Store)
    }

    /// The `k` records nearest to `text`, ascending by distance.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryResult>> {
        let embedding = match self.gateway.embed_one(text).await {
            EmbedOutcome::Embedded(vector) => vector,
            EmbedOutcome::Failed(reason) => {
                return Err(CollectionError::EmbeddingUnavailable { reason });
            }
        };
        self.store
            .query_nearest(&embedding, k)
            .await
            .map_err(CollectionError::Store)
    }
}
