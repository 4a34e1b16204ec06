//! Incremental indexing of a vault.
//!
//! The pipeline walks the vault, skips notes whose record is current, and
//! re-extracts, re-embeds and upserts the rest. Running it twice over an
//! unchanged vault performs no writes the second time.
//!
//! ## Pipeline Flow
//!
//! ```text
//! VaultScanner ─→ classify ─→ read ─→ DocumentExtractor ─→ VectorCollection::upsert
//!                    │                                        (EmbeddingGateway + VectorStore)
//!                 Current → unchanged
//! ```
//!
//! Per-file problems (a vanished file, a missing summary marker, an
//! unavailable embedding, a failed write) are counted and logged; only an
//! inaccessible root or an unreachable store aborts the run.

use super::extractor::{DocumentExtractor, ExtractError, VaultDocument};
use super::scanner::{self, ScanEntry, ScanOutcome, ScanSkip, ScanStatus, VaultScanner};
use crate::storage::{CollectionError, VectorCollection};
use anyhow::Result;
use serde::Serialize;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Files skipped during a run, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub vanished: usize,
    pub unreadable: usize,
    pub missing_summary_marker: usize,
    pub empty_content: usize,
    pub no_matching_rule: usize,
    pub embedding_unavailable: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.vanished
            + self.unreadable
            + self.missing_summary_marker
            + self.empty_content
            + self.no_matching_rule
            + self.embedding_unavailable
    }

    fn record_scan(&mut self, skip: &ScanSkip) {
        match skip {
            ScanSkip::Vanished { .. } => self.vanished += 1,
            ScanSkip::Unreadable { .. } => self.unreadable += 1,
        }
    }

    fn record_extract(&mut self, error: &ExtractError) {
        match error {
            ExtractError::MissingSummaryMarker { .. } => self.missing_summary_marker += 1,
            ExtractError::EmptyContent { .. } => self.empty_content += 1,
            ExtractError::NoMatchingRule { .. } => self.no_matching_rule += 1,
        }
    }
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingReport {
    /// Candidate notes seen
    pub scanned: usize,
    /// Records created
    pub indexed: usize,
    /// Records replaced
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: SkipCounts,
    /// Store writes that failed
    pub failed: usize,
}

impl IndexingReport {
    pub fn upserts(&self) -> usize {
        self.indexed + self.updated
    }
}

impl std::fmt::Display for IndexingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned {}, new {}, updated {}, unchanged {}, skipped {}, failed {}",
            self.scanned,
            self.indexed,
            self.updated,
            self.unchanged,
            self.skipped.total(),
            self.failed
        )
    }
}

pub struct IndexingPipeline {
    collection: VectorCollection,
    scanner: VaultScanner,
    extractor: DocumentExtractor,
}

impl IndexingPipeline {
    /// A pipeline with the default scanner and rule set.
    pub fn new(collection: VectorCollection) -> Self {
        Self {
            scanner: VaultScanner::new(collection.store().clone()),
            extractor: DocumentExtractor::default(),
            collection,
        }
    }

    pub fn with_scanner(mut self, scanner: VaultScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_extractor(mut self, extractor: DocumentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn collection(&self) -> &VectorCollection {
        &self.collection
    }

    /// Bring the store up to date with every note under `root`.
    pub async fn run(&self, root: &Path) -> Result<IndexingReport> {
        let root = scanner::resolve_root(root)?;
        info!("Indexing vault at {}", root.display());

        let mut report = IndexingReport::default();
        for path in self.scanner.candidates(&root) {
            report.scanned += 1;
            match self.scanner.classify(&path).await? {
                ScanOutcome::Skipped(skip) => {
                    warn!("Skipping: {}", skip);
                    report.skipped.record_scan(&skip);
                }
                ScanOutcome::Classified(entry) if entry.status == ScanStatus::Current => {
                    debug!("Unchanged: {}", entry.path.display());
                    report.unchanged += 1;
                }
                ScanOutcome::Classified(entry) => self.index_entry(entry, &mut report).await,
            }
        }

        info!("Indexing complete: {}", report);
        Ok(report)
    }

    async fn index_entry(&self, entry: ScanEntry, report: &mut IndexingReport) {
        let label = if entry.status == ScanStatus::Absent {
            "New"
        } else {
            "Modified"
        };
        info!("{}: processing {}", label, entry.path.display());

        let raw_content = match read_note(&entry.path).await {
            Ok(content) => content,
            Err(skip) => {
                warn!("Skipping: {}", skip);
                report.skipped.record_scan(&skip);
                return;
            }
        };

        let document = VaultDocument {
            id: entry.document_id,
            path: entry.path,
            raw_content,
            modified_at: entry.modified_at,
        };
        let extracted = match self.extractor.extract(&document) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Skipping: {}", e);
                report.skipped.record_extract(&e);
                return;
            }
        };

        match self
            .collection
            .upsert(&document.id, &extracted.embedded_text, extracted.metadata)
            .await
        {
            Ok(()) => {
                debug!(
                    "Indexed {} ({} chars)",
                    document.id,
                    extracted.embedded_text.len()
                );
                if entry.status == ScanStatus::Absent {
                    report.indexed += 1;
                } else {
                    report.updated += 1;
                }
            }
            Err(CollectionError::Store(e)) => {
                error!("Failed to store {}: {:#}", document.id, e);
                report.failed += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", document.id, e);
                report.skipped.embedding_unavailable += 1;
            }
        }
    }
}

async fn read_note(path: &Path) -> std::result::Result<String, ScanSkip> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ScanSkip::from_io(path, e))?;
    String::from_utf8(bytes)
        .map_err(|e| ScanSkip::from_io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}
