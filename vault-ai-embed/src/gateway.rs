//! Failure-isolating front door to an [`EmbeddingProvider`].
//!
//! The gateway is the only place in the workspace that calls a provider.
//! It replaces blank inputs with a single space (remote services reject
//! empty strings) and converts every provider failure into
//! [`EmbedOutcome::Failed`], logging it once here. Callers therefore see one
//! outcome per input, in input order, and can tell "embedding unavailable"
//! apart from a real vector without inspecting its length.

use crate::provider::EmbeddingProvider;
use half::f16;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::warn;

/// Placeholder sent in place of empty or whitespace-only input.
pub const BLANK_PLACEHOLDER: &str = " ";

/// Per-input result of an embedding call.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutcome {
    Embedded(Vec<f16>),
    Failed(String),
}

impl EmbedOutcome {
    pub fn is_embedded(&self) -> bool {
        matches!(self, EmbedOutcome::Embedded(_))
    }

    pub fn as_vector(&self) -> Option<&[f16]> {
        match self {
            EmbedOutcome::Embedded(vector) => Some(vector),
            EmbedOutcome::Failed(_) => None,
        }
    }

    pub fn into_vector(self) -> Option<Vec<f16>> {
        match self {
            EmbedOutcome::Embedded(vector) => Some(vector),
            EmbedOutcome::Failed(_) => None,
        }
    }
}

/// Replace blank input with [`BLANK_PLACEHOLDER`].
pub fn sanitize_input(text: &str) -> Cow<'_, str> {
    if text.trim().is_empty() {
        Cow::Borrowed(BLANK_PLACEHOLDER)
    } else {
        Cow::Borrowed(text)
    }
}

#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_name())
            .finish()
    }
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed `texts`, returning exactly one outcome per input in input order.
    pub async fn embed(&self, texts: &[String]) -> Vec<EmbedOutcome> {
        if texts.is_empty() {
            return Vec::new();
        }

        let sanitized: Vec<String> = texts
            .iter()
            .map(|text| sanitize_input(text).into_owned())
            .collect();

        let result = match self.provider.embed_texts(&sanitized).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Embedding call to {} failed for {} input(s): {}",
                    self.provider.provider_name(),
                    texts.len(),
                    e
                );
                return failed_all(texts.len(), &e.to_string());
            }
        };

        if result.len() != texts.len() {
            warn!(
                "Embedding provider {} returned {} vectors for {} inputs",
                self.provider.provider_name(),
                result.len(),
                texts.len()
            );
            return failed_all(
                texts.len(),
                &format!(
                    "provider returned {} embeddings for {} inputs",
                    result.len(),
                    texts.len()
                ),
            );
        }

        result
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(i, vector)| {
                if vector.is_empty() {
                    warn!("Embedding provider returned an empty vector for input {}", i);
                    EmbedOutcome::Failed("provider returned an empty vector".to_string())
                } else {
                    EmbedOutcome::Embedded(vector)
                }
            })
            .collect()
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> EmbedOutcome {
        self.embed(&[text.to_string()])
            .await
            .pop()
            .unwrap_or_else(|| EmbedOutcome::Failed("no outcome returned".to_string()))
    }

    /// Same as [`embed`](Self::embed), with failed items as zero-length vectors.
    pub async fn embed_lossy(&self, texts: &[String]) -> Vec<Vec<f16>> {
        self.embed(texts)
            .await
            .into_iter()
            .map(|outcome| outcome.into_vector().unwrap_or_default())
            .collect()
    }
}

fn failed_all(count: usize, reason: &str) -> Vec<EmbedOutcome> {
    (0..count)
        .map(|_| EmbedOutcome::Failed(reason.to_string()))
        .collect()
}
