//! Vault walking and change detection.
//!
//! [`VaultScanner::candidates`] lazily enumerates note files under a root and
//! [`VaultScanner::classify`] compares each file's modification time with the
//! record already in the store.

use crate::storage::VectorStore;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, SubsecRound, Utc};
use ignore::WalkBuilder;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Whether a note needs (re)indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// No record exists for the note
    Absent,
    /// A record exists but is older than the file
    Stale,
    /// The record reflects the file as it is now
    Current,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub document_id: String,
    pub path: PathBuf,
    /// Modification time observed by this scan
    pub modified_at: DateTime<Utc>,
    pub status: ScanStatus,
}

/// A per-file condition that skips the file without aborting the run.
#[derive(Error, Debug)]
pub enum ScanSkip {
    #[error("{} vanished before it could be read", path.display())]
    Vanished { path: PathBuf },

    #[error("{} is unreadable: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScanSkip {
    /// Classify an I/O error hit while touching `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            ScanSkip::Vanished {
                path: path.to_path_buf(),
            }
        } else {
            ScanSkip::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    Classified(ScanEntry),
    Skipped(ScanSkip),
}

/// File modification time in UTC, truncated to the precision the store keeps.
pub fn file_modified_at(metadata: &Metadata) -> io::Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(metadata.modified()?).trunc_subsecs(6))
}

/// Store key for the note at `path`.
pub fn document_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Canonicalize `root`, failing when it is missing or not a directory.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = root
        .canonicalize()
        .with_context(|| format!("Vault root {} is not accessible", root.display()))?;
    if !resolved.is_dir() {
        bail!("Vault root {} is not a directory", resolved.display());
    }
    Ok(resolved)
}

pub struct VaultScanner {
    store: Arc<dyn VectorStore>,
    extension: String,
    skip_hidden: bool,
}

impl VaultScanner {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            extension: "md".to_string(),
            skip_hidden: false,
        }
    }

    /// Only files with exactly this extension (no leading dot) are notes
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    /// Note files under `root`, walked lazily in file-name order.
    ///
    /// Symlinks to files are notes; symlinked directories are not entered.
    /// Walk errors on individual entries are logged and skipped.
    pub fn candidates(&self, root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .hidden(self.skip_hidden)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));

        builder.build().filter_map(move |entry| match entry {
            Ok(entry) => {
                let is_file = entry
                    .file_type()
                    .is_some_and(|t| t.is_file() || (t.is_symlink() && entry.path().is_file()));
                let path = entry.into_path();
                (is_file && self.is_note(&path)).then_some(path)
            }
            Err(e) => {
                warn!("Skipping unwalkable entry: {}", e);
                None
            }
        })
    }

    fn is_note(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(self.extension.as_str())
    }

    /// Stat `path` and compare it with the stored record.
    ///
    /// Per-file problems come back as [`ScanOutcome::Skipped`]; an `Err`
    /// means the store could not be consulted.
    pub async fn classify(&self, path: &Path) -> Result<ScanOutcome> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(ScanOutcome::Skipped(ScanSkip::from_io(path, e))),
        };
        let modified_at = match file_modified_at(&metadata) {
            Ok(modified_at) => modified_at,
            Err(e) => return Ok(ScanOutcome::Skipped(ScanSkip::from_io(path, e))),
        };

        let document_id = document_id(path);
        let existing = self
            .store
            .get(&document_id)
            .await
            .with_context(|| format!("Failed to look up {document_id}"))?;

        let status = match existing {
            None => ScanStatus::Absent,
            Some(record) if record.metadata.modified_at < modified_at => ScanStatus::Stale,
            Some(_) => ScanStatus::Current,
        };
        debug!("{} is {:?}", document_id, status);

        Ok(ScanOutcome::Classified(ScanEntry {
            document_id,
            path: path.to_path_buf(),
            modified_at,
            status,
        }))
    }
}
