//! SQLite implementation of the [`VectorStore`] trait.
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per named collection; the metric is fixed at creation
//! CREATE TABLE collections (
//!     name TEXT PRIMARY KEY,
//!     metric TEXT NOT NULL,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Records keyed by (collection, id)
//! CREATE TABLE records (
//!     collection TEXT NOT NULL REFERENCES collections(name),
//!     id TEXT NOT NULL,                -- absolute note path
//!     document TEXT NOT NULL,          -- embedded text
//!     source_category TEXT NOT NULL,
//!     modified_at_us INTEGER NOT NULL, -- note mtime, unix microseconds
//!     full_path TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     dimension INTEGER NOT NULL,
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
//!     PRIMARY KEY (collection, id)
//! );
//! ```
//!
//! Nearest neighbors are computed in memory over the collection's rows.
//! Rows whose dimension differs from the query vector are skipped.

use super::{
    DistanceMetric, IndexRecord, QueryResult, RecordMetadata, SourceCategory, StoreStats,
    VectorStore,
};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// SQLite-backed vector store bound to one collection.
#[derive(Clone, Debug)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
    metric: DistanceMetric,
}

impl SqliteVectorStore {
    /// Opens (creating if needed) the database file and the named collection.
    ///
    /// An existing collection keeps the metric it was created with.
    pub async fn open(db_path: &Path, collection: &str, metric: DistanceMetric) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                    .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                    .busy_timeout(std::time::Duration::from_secs(5))
                    .foreign_keys(true)
                    .create_if_missing(true),
            )
            .await
            .with_context(|| format!("Failed to open vector store at {}", db_path.display()))?;

        Self::new_with_pool(pool, collection, metric).await
    }

    /// Opens an index that must already exist, without creating anything.
    ///
    /// Fails when the file is missing or does not hold `collection`, so
    /// readers never leave an empty database behind.
    pub async fn open_existing(db_path: &Path, collection: &str) -> Result<Self> {
        if !db_path.is_file() {
            bail!("No index at {}; run `index` first or pass --db", db_path.display());
        }

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .busy_timeout(std::time::Duration::from_secs(5))
                    .foreign_keys(true)
                    .create_if_missing(false),
            )
            .await
            .with_context(|| format!("Failed to open vector store at {}", db_path.display()))?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT metric FROM collections WHERE name = ?1")
                .bind(collection)
                .fetch_optional(&pool)
                .await
                .with_context(|| format!("{} is not a vault index", db_path.display()))?;
        let Some(stored) = stored else {
            pool.close().await;
            bail!("Collection {collection} not found in {}", db_path.display());
        };
        let metric = DistanceMetric::parse(&stored)
            .ok_or_else(|| anyhow!("Collection {collection} has unknown metric {stored}"))?;

        debug!("Opened existing collection {} ({})", collection, metric.as_str());
        Ok(Self {
            pool,
            collection: collection.to_string(),
            metric,
        })
    }

    /// Opens a store with in-memory SQLite storage for testing.
    pub async fn open_memory(collection: &str, metric: DistanceMetric) -> Result<Self> {
        // A single long-lived connection: every new :memory: connection is a fresh database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::new_with_pool(pool, collection, metric).await
    }

    async fn new_with_pool(
        pool: SqlitePool,
        collection: &str,
        requested_metric: DistanceMetric,
    ) -> Result<Self> {
        Self::create_tables(&pool).await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, metric) VALUES (?1, ?2)")
            .bind(collection)
            .bind(requested_metric.as_str())
            .execute(&pool)
            .await?;

        let stored: String = sqlx::query_scalar("SELECT metric FROM collections WHERE name = ?1")
            .bind(collection)
            .fetch_one(&pool)
            .await?;
        let metric = DistanceMetric::parse(&stored)
            .ok_or_else(|| anyhow!("Collection {collection} has unknown metric {stored}"))?;
        if metric != requested_metric {
            warn!(
                "Collection {} was created with metric {}; ignoring requested {}",
                collection,
                metric.as_str(),
                requested_metric.as_str()
            );
        }

        info!("Opened collection {} ({})", collection, metric.as_str());
        Ok(Self {
            pool,
            collection: collection.to_string(),
            metric,
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metric TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                source_category TEXT NOT NULL,
                modified_at_us INTEGER NOT NULL,
                full_path TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_category ON records(collection, source_category)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool, flushing the WAL.
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Closed collection {}", self.collection);
    }

    fn row_to_record(row: &SqliteRow) -> Result<IndexRecord> {
        let id: String = row.try_get("id")?;
        let document: String = row.try_get("document")?;
        let category: String = row.try_get("source_category")?;
        let modified_at_us: i64 = row.try_get("modified_at_us")?;
        let full_path: String = row.try_get("full_path")?;
        let embedding_bytes: Vec<u8> = row.try_get("embedding")?;

        let source_category = SourceCategory::parse(&category)
            .ok_or_else(|| anyhow!("Record {id} has unknown source category {category}"))?;
        let modified_at = DateTime::<Utc>::from_timestamp_micros(modified_at_us)
            .ok_or_else(|| anyhow!("Record {id} has out-of-range timestamp {modified_at_us}"))?;
        let embedding = bytemuck::pod_collect_to_vec::<u8, f16>(&embedding_bytes);

        Ok(IndexRecord {
            id,
            embedded_text: document,
            embedding,
            metadata: RecordMetadata {
                source_category,
                modified_at,
                full_path: PathBuf::from(full_path),
            },
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let row = sqlx::query(
            "SELECT id, document, source_category, modified_at_us, full_path, embedding
             FROM records WHERE collection = ?1 AND id = ?2",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn upsert(&self, record: IndexRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(anyhow!("Refusing to store {} without an embedding", record.id));
        }
        let embedding_bytes = bytemuck::cast_slice::<f16, u8>(&record.embedding);

        sqlx::query(
            r#"
            INSERT INTO records
                (collection, id, document, source_category, modified_at_us, full_path, embedding, dimension, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            ON CONFLICT(collection, id) DO UPDATE SET
                document = excluded.document,
                source_category = excluded.source_category,
                modified_at_us = excluded.modified_at_us,
                full_path = excluded.full_path,
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                indexed_at = datetime('now')
            "#,
        )
        .bind(&self.collection)
        .bind(&record.id)
        .bind(&record.embedded_text)
        .bind(record.metadata.source_category.as_str())
        .bind(record.metadata.modified_at.timestamp_micros())
        .bind(record.metadata.full_path.to_string_lossy().into_owned())
        .bind(embedding_bytes)
        .bind(record.embedding.len() as i64)
        .execute(&self.pool)
        .await?;

        debug!("Upserted {} into {}", record.id, self.collection);
        Ok(())
    }

    async fn query_nearest(&self, embedding: &[f16], k: usize) -> Result<Vec<QueryResult>> {
        if k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document, source_category, modified_at_us, full_path, embedding
             FROM records WHERE collection = ?1 AND dimension = ?2",
        )
        .bind(&self.collection)
        .bind(embedding.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::row_to_record(row)?;
            let distance = self.metric.distance(embedding, &record.embedding);
            results.push(QueryResult {
                id: record.id,
                document: record.embedded_text,
                metadata: record.metadata,
                distance,
            });
        }

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query(
            "SELECT source_category, COUNT(*) AS n FROM records WHERE collection = ?1 GROUP BY source_category",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = StoreStats {
            collection: self.collection.clone(),
            metric: self.metric.as_str().to_string(),
            ..StoreStats::default()
        };
        for row in rows {
            let category: String = row.try_get("source_category")?;
            let count = row.try_get::<i64, _>("n")? as usize;
            stats.total_records += count;
            match SourceCategory::parse(&category) {
                Some(SourceCategory::ConversationSummary) => stats.conversation_summaries += count,
                Some(SourceCategory::FullNote) => stats.full_notes += count,
                None => warn!("Unknown source category {} in {}", category, self.collection),
            }
        }

        let dimensions: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT dimension FROM records WHERE collection = ?1 ORDER BY dimension",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        stats.dimensions = dimensions.into_iter().map(|d| d as usize).collect();

        let newest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(modified_at_us) FROM records WHERE collection = ?1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        stats.newest_modified_at = newest.and_then(DateTime::<Utc>::from_timestamp_micros);

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, text: &str, vector: &[f32], category: SourceCategory) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            embedded_text: text.to_string(),
            embedding: vector.iter().copied().map(f16::from_f32).collect(),
            metadata: RecordMetadata {
                source_category: category,
                modified_at: DateTime::<Utc>::from_timestamp_micros(1_700_000_000_123_456)
                    .unwrap(),
                full_path: PathBuf::from(id),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_then_get_round_trip() -> Result<()> {
        let store = SqliteVectorStore::open_memory("notes", DistanceMetric::L2).await?;
        let written = record("/vault/a.md", "alpha", &[0.1, 0.2, 0.3], SourceCategory::FullNote);
        store.upsert(written.clone()).await?;

        let fetched = store.get("/vault/a.md").await?.expect("record present");
        assert_eq!(fetched.embedded_text, written.embedded_text);
        assert_eq!(fetched.metadata, written.metadata);
        assert_eq!(fetched.embedding, written.embedding);

        assert!(store.get("/vault/missing.md").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_fully_replaces() -> Result<()> {
        let store = SqliteVectorStore::open_memory("notes", DistanceMetric::L2).await?;
        store
            .upsert(record("/v/c.md", "old", &[1.0, 0.0], SourceCategory::FullNote))
            .await?;

        let mut newer = record(
            "/v/c.md",
            "new summary",
            &[0.0, 1.0, 0.0],
            SourceCategory::ConversationSummary,
        );
        newer.metadata.modified_at =
            DateTime::<Utc>::from_timestamp_micros(1_800_000_000_000_000).unwrap();
        store.upsert(newer.clone()).await?;

        let fetched = store.get("/v/c.md").await?.unwrap();
        assert_eq!(fetched, newer);
        assert_eq!(store.stats().await?.total_records, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_limits() -> Result<()> {
        let store = SqliteVectorStore::open_memory("notes", DistanceMetric::L2).await?;
        store
            .upsert(record("/v/far.md", "far", &[0.0, 1.0], SourceCategory::FullNote))
            .await?;
        store
            .upsert(record("/v/near.md", "near", &[1.0, 0.0], SourceCategory::FullNote))
            .await?;
        store
            .upsert(record("/v/mid.md", "mid", &[0.6, 0.8], SourceCategory::FullNote))
            .await?;
        // Different width, never comparable with a 2-d query
        store
            .upsert(record("/v/wide.md", "wide", &[1.0, 0.0, 0.0], SourceCategory::FullNote))
            .await?;

        let query = [f16::from_f32(1.0), f16::from_f32(0.0)];
        let results = store.query_nearest(&query, 2).await?;
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["/v/near.md", "/v/mid.md"]);
        assert_eq!(results[0].distance, 0.0);
        assert!(results[0].distance <= results[1].distance);

        let all = store.query_nearest(&query, 10).await?;
        assert_eq!(all.len(), 3);
        assert!(store.query_nearest(&query, 0).await?.is_empty());
        assert!(store.query_nearest(&[], 5).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_embedding_is_rejected() -> Result<()> {
        let store = SqliteVectorStore::open_memory("notes", DistanceMetric::L2).await?;
        let result = store
            .upsert(record("/v/empty.md", "text", &[], SourceCategory::FullNote))
            .await;
        assert!(result.is_err());
        assert!(store.get("/v/empty.md").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_collections_are_isolated() -> Result<()> {
        let temp_dir = tempdir()?;
        let db = temp_dir.path().join("index.db");

        let first = SqliteVectorStore::open(&db, "first", DistanceMetric::L2).await?;
        first
            .upsert(record("/v/a.md", "a", &[1.0], SourceCategory::FullNote))
            .await?;
        let second = SqliteVectorStore::open(&db, "second", DistanceMetric::Cosine).await?;
        assert!(second.get("/v/a.md").await?.is_none());
        assert_eq!(second.metric(), DistanceMetric::Cosine);

        first.close().await;
        second.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_persists_across_reopen() -> Result<()> {
        let temp_dir = tempdir()?;
        let db = temp_dir.path().join("nested").join("index.db");

        let store = SqliteVectorStore::open(&db, "vault", DistanceMetric::Cosine).await?;
        store
            .upsert(record("/v/keep.md", "kept", &[0.5, 0.5], SourceCategory::FullNote))
            .await?;
        store.close().await;

        // The collection keeps its original metric
        let reopened = SqliteVectorStore::open(&db, "vault", DistanceMetric::L2).await?;
        assert_eq!(reopened.metric(), DistanceMetric::Cosine);
        let fetched = reopened.get("/v/keep.md").await?.unwrap();
        assert_eq!(fetched.embedded_text, "kept");
        reopened.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_open_existing_never_creates() -> Result<()> {
        let temp_dir = tempdir()?;
        let db = temp_dir.path().join("index.db");

        let err = SqliteVectorStore::open_existing(&db, "vault").await.unwrap_err();
        assert!(err.to_string().contains("No index at"));
        assert!(!db.exists());

        let store = SqliteVectorStore::open(&db, "vault", DistanceMetric::Cosine).await?;
        store
            .upsert(record("/v/a.md", "a", &[1.0, 0.0], SourceCategory::FullNote))
            .await?;
        store.close().await;

        let reader = SqliteVectorStore::open_existing(&db, "vault").await?;
        assert_eq!(reader.metric(), DistanceMetric::Cosine);
        assert!(reader.get("/v/a.md").await?.is_some());
        reader.close().await;

        let missing = SqliteVectorStore::open_existing(&db, "other").await;
        assert!(missing.unwrap_err().to_string().contains("Collection other not found"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stats() -> Result<()> {
        let store = SqliteVectorStore::open_memory("notes", DistanceMetric::L2).await?;
        let empty = store.stats().await?;
        assert_eq!(empty.total_records, 0);
        assert!(empty.newest_modified_at.is_none());

        store
            .upsert(record("/v/a.md", "a", &[1.0, 0.0], SourceCategory::FullNote))
            .await?;
        store
            .upsert(record(
                "/v/Conversations/b.md",
                "b",
                &[0.0, 1.0],
                SourceCategory::ConversationSummary,
            ))
            .await?;

        let stats = store.stats().await?;
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.full_notes, 1);
        assert_eq!(stats.conversation_summaries, 1);
        assert_eq!(stats.dimensions, vec![2]);
        assert_eq!(stats.metric, "l2");
        assert!(stats.newest_modified_at.is_some());
        Ok(())
    }
}
