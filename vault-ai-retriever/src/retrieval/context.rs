//! Query-time retrieval and context assembly.
//!
//! [`ContextAssembler`] turns a live query into a [`ContextBlock`]: the
//! nearest notes, filtered by a distance threshold and attributed to their
//! source file. The block renders to the text an assistant turn prepends to
//! the user's message.

use crate::storage::{CollectionError, QueryResult, VectorCollection};
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    /// Base name of the note the text came from
    pub source_file_name: String,
    pub text: String,
    pub distance: f32,
}

impl ContextEntry {
    fn from_result(result: QueryResult) -> Self {
        let source_file_name = result
            .metadata
            .full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.id.clone());
        Self {
            source_file_name,
            text: result.document,
            distance: result.distance,
        }
    }
}

/// Retrieved context, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every entry as an attributed paragraph, in order.
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for entry in &self.entries {
            let _ = write!(
                rendered,
                "Context from my note '{}':\n{}\n\n",
                entry.source_file_name, entry.text
            );
        }
        rendered
    }

    /// The user message with this context appended.
    pub fn user_message(&self, query: &str) -> String {
        format!(
            "{}\n\n--- Relevant context from my notes ---\n{}",
            query,
            self.render()
        )
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    collection: VectorCollection,
    k: usize,
    distance_threshold: f32,
}

impl ContextAssembler {
    pub fn new(collection: VectorCollection) -> Self {
        Self {
            collection,
            k: DEFAULT_TOP_K,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub async fn retrieve(&self, query: &str) -> Result<ContextBlock> {
        self.retrieve_with(query, self.k, self.distance_threshold).await
    }

    /// Up to `k` notes whose distance is strictly below `threshold`.
    ///
    /// An unavailable query embedding yields an empty block; store failures
    /// are returned.
    pub async fn retrieve_with(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<ContextBlock> {
        let results = match self.collection.query(query, k).await {
            Ok(results) => results,
            Err(CollectionError::Store(e)) => return Err(e),
            Err(e) => {
                warn!("No context retrieved: {}", e);
                return Ok(ContextBlock::default());
            }
        };

        for result in &results {
            debug!(
                "Retrieved {} ({}) at distance {:.4}",
                result.id, result.metadata.source_category, result.distance
            );
        }

        Ok(filter_results(results, threshold))
    }
}

/// Keep results strictly closer than `threshold`, preserving order.
pub fn filter_results(results: Vec<QueryResult>, threshold: f32) -> ContextBlock {
    ContextBlock {
        entries: results
            .into_iter()
            .filter(|result| result.distance < threshold)
            .map(ContextEntry::from_result)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite_store::SqliteVectorStore;
    use crate::storage::{DistanceMetric, RecordMetadata, SourceCategory};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tracing_test::traced_test;
    use vault_ai_embed::{
        EmbedError, EmbeddingGateway, EmbeddingProvider, EmbeddingResult, HashingProvider,
    };

    fn result(path: &str, text: &str, distance: f32) -> QueryResult {
        QueryResult {
            id: path.to_string(),
            document: text.to_string(),
            metadata: RecordMetadata {
                source_category: SourceCategory::FullNote,
                modified_at: Utc::now(),
                full_path: PathBuf::from(path),
            },
            distance,
        }
    }

    #[test]
    fn test_threshold_is_strict_and_order_kept() {
        let block = filter_results(
            vec![
                result("/v/a.md", "a", 0.3),
                result("/v/b.md", "b", 0.8),
                result("/v/c.md", "c", 0.81),
            ],
            0.8,
        );
        assert_eq!(block.len(), 1);
        assert_eq!(block.entries[0].source_file_name, "a.md");

        let block = filter_results(
            vec![result("/v/x.md", "x", 0.1), result("/v/y.md", "y", 0.5)],
            0.8,
        );
        let names: Vec<&str> = block
            .entries
            .iter()
            .map(|e| e.source_file_name.as_str())
            .collect();
        assert_eq!(names, vec!["x.md", "y.md"]);
    }

    #[test]
    fn test_render_and_user_message() {
        let block = filter_results(
            vec![
                result("/v/Recipes/bread.md", "Use 75% hydration.", 0.2),
                result("/v/Conversations/chat.md", "We talked about flour.", 0.4),
            ],
            0.8,
        );
        let rendered = block.render();
        assert_eq!(
            rendered,
            "Context from my note 'bread.md':\nUse 75% hydration.\n\n\
             Context from my note 'chat.md':\nWe talked about flour.\n\n"
        );
        assert_eq!(
            block.user_message("How wet should dough be?"),
            format!(
                "How wet should dough be?\n\n--- Relevant context from my notes ---\n{rendered}"
            )
        );

        assert_eq!(ContextBlock::default().render(), "");
    }

    struct DownProvider;

    #[async_trait]
    impl EmbeddingProvider for DownProvider {
        async fn embed_texts(&self, _texts: &[String]) -> vault_ai_embed::Result<EmbeddingResult> {
            Err(EmbedError::Service {
                status: 502,
                body: "bad gateway".to_string(),
            })
        }

        fn provider_name(&self) -> &str {
            "down"
        }

        fn model_name(&self) -> &str {
            "none"
        }
    }

    async fn collection(provider: Arc<dyn EmbeddingProvider>) -> VectorCollection {
        let store = SqliteVectorStore::open_memory("ctx", DistanceMetric::L2)
            .await
            .unwrap();
        VectorCollection::new(Arc::new(store), EmbeddingGateway::new(provider))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_query_embedding_failure_gives_empty_block() {
        let assembler = ContextAssembler::new(collection(Arc::new(DownProvider)).await);
        let block = assembler.retrieve("anything").await.unwrap();
        assert!(block.is_empty());
        assert!(logs_contain("No context retrieved"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_retrieve_logs_hits_and_filters() {
        let collection = collection(Arc::new(HashingProvider::new(64))).await;
        let metadata = |path: &str| RecordMetadata {
            source_category: SourceCategory::FullNote,
            modified_at: Utc::now(),
            full_path: PathBuf::from(path),
        };
        collection
            .upsert("/v/tea.md", "oolong tea tasting notes", metadata("/v/tea.md"))
            .await
            .unwrap();
        collection
            .upsert("/v/car.md", "winter tire rotation", metadata("/v/car.md"))
            .await
            .unwrap();

        let assembler = ContextAssembler::new(collection);
        let block = assembler.retrieve("oolong tea tasting notes").await.unwrap();
        assert_eq!(block.entries[0].source_file_name, "tea.md");
        assert!(block.entries.iter().all(|e| e.distance < 0.8));
        assert!(logs_contain("Retrieved /v/tea.md (full_note)"));

        let none = assembler
            .retrieve_with("oolong tea tasting notes", 5, 0.0)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
