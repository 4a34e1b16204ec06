//! TOML configuration for the retriever.
//!
//! ```toml
//! [vault]
//! root = "/home/me/Obsidian"
//! extension = "md"
//! skip_hidden = false
//!
//! [store]
//! path = "/home/me/.cache/vault-ai.db"   # default: <root>/.vault-ai.db
//! collection = "obsidian_vault_main"
//! metric = "l2"                          # or "cosine"
//!
//! [extraction]
//! conversation_segment = "Conversations"
//! summary_marker = "## Overall Summary"
//! transcript_marker = "# Transcript"
//!
//! [retrieval]
//! k = 5
//! distance_threshold = 0.8
//!
//! [embedding]
//! provider = "openai"                    # "fastembed" or "hashing"
//! model = "text-embedding-3-small"
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use crate::retrieval::context::{DEFAULT_DISTANCE_THRESHOLD, DEFAULT_TOP_K};
use crate::retrieval::extractor::{
    ConversationSummaryRule, DEFAULT_CONVERSATION_SEGMENT, DEFAULT_SUMMARY_MARKER,
    DEFAULT_TRANSCRIPT_MARKER,
};
use crate::storage::DistanceMetric;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vault_ai_embed::EmbedConfig;

/// Database file created in the vault root when `[store] path` is unset
pub const DEFAULT_DB_FILE: &str = ".vault-ai.db";
pub const DEFAULT_COLLECTION: &str = "obsidian_vault_main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    pub root: Option<PathBuf>,
    /// Note file extension, without the dot; compared case-sensitively
    pub extension: String,
    pub skip_hidden: bool,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            root: None,
            extension: "md".to_string(),
            skip_hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
    pub collection: String,
    /// Only used when the collection is first created
    pub metric: DistanceMetric,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            collection: DEFAULT_COLLECTION.to_string(),
            metric: DistanceMetric::L2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    pub conversation_segment: String,
    pub summary_marker: String,
    pub transcript_marker: String,
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            conversation_segment: DEFAULT_CONVERSATION_SEGMENT.to_string(),
            summary_marker: DEFAULT_SUMMARY_MARKER.to_string(),
            transcript_marker: DEFAULT_TRANSCRIPT_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub k: usize,
    pub distance_threshold: f32,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            k: DEFAULT_TOP_K,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub vault: VaultSection,
    pub store: StoreSection,
    pub extraction: ExtractionSection,
    pub retrieval: RetrievalSection,
    pub embedding: EmbedConfig,
}

impl VaultConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vault.extension.is_empty() || self.vault.extension.starts_with('.') {
            bail!(
                "[vault] extension must be non-empty and given without a dot, got {:?}",
                self.vault.extension
            );
        }
        if self.store.collection.trim().is_empty() {
            bail!("[store] collection must not be empty");
        }
        if self.extraction.conversation_segment.is_empty()
            || self.extraction.summary_marker.is_empty()
            || self.extraction.transcript_marker.is_empty()
        {
            bail!("[extraction] segment and markers must not be empty");
        }
        if !self.retrieval.distance_threshold.is_finite() || self.retrieval.distance_threshold < 0.0
        {
            bail!(
                "[retrieval] distance_threshold must be a non-negative number, got {}",
                self.retrieval.distance_threshold
            );
        }
        self.embedding
            .validate()
            .context("Invalid [embedding] section")?;
        Ok(())
    }

    /// The configured vault root, or the current directory.
    pub fn vault_root(&self) -> PathBuf {
        self.vault
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The store file: `[store] path`, or the default file inside `root`.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| root.join(DEFAULT_DB_FILE))
    }

    pub fn conversation_rule(&self) -> ConversationSummaryRule {
        ConversationSummaryRule::new(
            &self.extraction.conversation_segment,
            &self.extraction.summary_marker,
            &self.extraction.transcript_marker,
        )
    }
}
