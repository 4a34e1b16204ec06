//! Hybrid document extraction.
//!
//! Which part of a note gets embedded depends on where the note lives.
//! Archived conversations contribute only their summary section; every
//! other note is embedded whole. The choice is an ordered list of
//! [`ExtractionRule`]s where the first rule whose `matches` accepts the path
//! decides.

use crate::storage::{RecordMetadata, SourceCategory};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONVERSATION_SEGMENT: &str = "Conversations";
pub const DEFAULT_SUMMARY_MARKER: &str = "## Overall Summary";
pub const DEFAULT_TRANSCRIPT_MARKER: &str = "# Transcript";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Summary marker not found in {}", path.display())]
    MissingSummaryMarker { path: PathBuf },

    #[error("No content to embed in {}", path.display())]
    EmptyContent { path: PathBuf },

    #[error("No extraction rule matches {}", path.display())]
    NoMatchingRule { path: PathBuf },
}

/// A note read from disk, before extraction.
#[derive(Debug, Clone)]
pub struct VaultDocument {
    pub id: String,
    pub path: PathBuf,
    pub raw_content: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub embedded_text: String,
    pub metadata: RecordMetadata,
}

pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, path: &Path) -> bool;

    fn extract(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<(String, SourceCategory), ExtractError>;
}

/// Embeds only the summary section of a conversation archive.
#[derive(Debug, Clone)]
pub struct ConversationSummaryRule {
    segment: String,
    summary_marker: String,
    transcript_marker: String,
}

impl Default for ConversationSummaryRule {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONVERSATION_SEGMENT,
            DEFAULT_SUMMARY_MARKER,
            DEFAULT_TRANSCRIPT_MARKER,
        )
    }
}

impl ConversationSummaryRule {
    pub fn new(
        segment: impl Into<String>,
        summary_marker: impl Into<String>,
        transcript_marker: impl Into<String>,
    ) -> Self {
        Self {
            segment: segment.into(),
            summary_marker: summary_marker.into(),
            transcript_marker: transcript_marker.into(),
        }
    }
}

impl ExtractionRule for ConversationSummaryRule {
    fn name(&self) -> &str {
        "conversation-summary"
    }

    // Substring of the whole path string, so "Conversations" anywhere in a
    // directory or file name counts
    fn matches(&self, path: &Path) -> bool {
        path.to_string_lossy().contains(self.segment.as_str())
    }

    fn extract(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<(String, SourceCategory), ExtractError> {
        let start = content
            .find(self.summary_marker.as_str())
            .map(|i| i + self.summary_marker.len())
            .ok_or_else(|| ExtractError::MissingSummaryMarker {
                path: path.to_path_buf(),
            })?;

        let rest = &content[start..];
        let end = rest
            .find(self.transcript_marker.as_str())
            .unwrap_or(rest.len());

        let summary = rest[..end].trim();
        if summary.is_empty() {
            return Err(ExtractError::EmptyContent {
                path: path.to_path_buf(),
            });
        }
        Ok((summary.to_string(), SourceCategory::ConversationSummary))
    }
}

/// Embeds the note verbatim.
#[derive(Debug, Clone, Default)]
pub struct FullNoteRule;

impl ExtractionRule for FullNoteRule {
    fn name(&self) -> &str {
        "full-note"
    }

    fn matches(&self, _path: &Path) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<(String, SourceCategory), ExtractError> {
        if content.trim().is_empty() {
            return Err(ExtractError::EmptyContent {
                path: path.to_path_buf(),
            });
        }
        Ok((content.to_string(), SourceCategory::FullNote))
    }
}

pub struct DocumentExtractor {
    rules: Vec<Box<dyn ExtractionRule>>,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ConversationSummaryRule::default()),
            Box::new(FullNoteRule),
        ])
    }
}

impl std::fmt::Debug for DocumentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

impl DocumentExtractor {
    pub fn new(rules: Vec<Box<dyn ExtractionRule>>) -> Self {
        Self { rules }
    }

    /// The default rule order with a custom conversation rule.
    pub fn with_conversation_rule(rule: ConversationSummaryRule) -> Self {
        Self::new(vec![Box::new(rule), Box::new(FullNoteRule)])
    }

    pub fn extract(&self, document: &VaultDocument) -> Result<ExtractedDocument, ExtractError> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(&document.path))
            .ok_or_else(|| ExtractError::NoMatchingRule {
                path: document.path.clone(),
            })?;

        let (embedded_text, source_category) =
            rule.extract(&document.path, &document.raw_content)?;

        Ok(ExtractedDocument {
            embedded_text,
            metadata: RecordMetadata {
                source_category,
                modified_at: document.modified_at,
                full_path: document.path.clone(),
            },
        })
    }
}
