//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default model for the OpenAI-compatible provider.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
/// Default model for the local fastembed provider.
pub const DEFAULT_FASTEMBED_MODEL: &str = "all-minilm-l6-v2";
/// Default vector width of the hashing provider.
pub const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any service exposing the OpenAI `/embeddings` endpoint
    #[default]
    OpenAi,
    /// Local ONNX models through fastembed
    FastEmbed,
    /// Deterministic feature hashing, no model and no network
    Hashing,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::FastEmbed => "fastembed",
            ProviderKind::Hashing => "hashing",
        }
    }
}

/// Configuration for embedding providers.
///
/// This is the `[embedding]` section of the retriever's TOML file. Fields
/// that do not apply to the selected provider are ignored, so switching
/// providers only needs the `provider` key to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Backend used to produce vectors
    pub provider: ProviderKind,
    /// Model identifier; each provider has its own default
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Requested output width (OpenAI `dimensions`, hashing vector size)
    pub dimensions: Option<usize>,
    /// Maximum number of texts sent in one provider call
    pub batch_size: usize,
    /// HTTP timeout in seconds for remote providers
    pub timeout_secs: u64,
    /// Where fastembed keeps downloaded models
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
            batch_size: 64,
            timeout_secs: 30,
            cache_dir: None,
        }
    }
}

impl EmbedConfig {
    /// OpenAI-compatible provider with the given model
    pub fn openai(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Local fastembed provider with the given built-in model
    pub fn fastembed(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::FastEmbed,
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Feature-hashing provider producing `dimensions`-wide vectors
    pub fn hashing(dimensions: usize) -> Self {
        Self {
            provider: ProviderKind::Hashing,
            dimensions: Some(dimensions),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the API base URL (builder style)
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Set the environment variable holding the API key (builder style)
    pub fn with_api_key_env(self, api_key_env: impl Into<String>) -> Self {
        Self {
            api_key_env: api_key_env.into(),
            ..self
        }
    }

    /// Set the fastembed model cache directory (builder style)
    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    /// Model name, falling back to the provider's default
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, ProviderKind::OpenAi) => DEFAULT_OPENAI_MODEL,
            (None, ProviderKind::FastEmbed) => DEFAULT_FASTEMBED_MODEL,
            (None, ProviderKind::Hashing) => "feature-hashing",
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(EmbedError::MissingApiKey {
                var: self.api_key_env.clone(),
            }),
        }
    }

    /// Check settings that would otherwise only fail on the first request.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        if self.dimensions == Some(0) {
            return Err(EmbedError::invalid_config("dimensions must be at least 1"));
        }
        if self.provider == ProviderKind::OpenAi && self.base_url.trim().is_empty() {
            return Err(EmbedError::invalid_config("base_url is required"));
        }
        tracing::debug!(
            "Embedding configuration valid: {} / {}",
            self.provider.as_str(),
            self.model_name()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model_name(), "text-embedding-3-small");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.batch_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_defaults_follow_provider() {
        assert_eq!(
            EmbedConfig {
                provider: ProviderKind::FastEmbed,
                ..EmbedConfig::default()
            }
            .model_name(),
            DEFAULT_FASTEMBED_MODEL
        );
        assert_eq!(
            EmbedConfig::openai("text-embedding-3-large").model_name(),
            "text-embedding-3-large"
        );
    }

    #[test]
    fn test_builder_methods() {
        let config = EmbedConfig::hashing(32)
            .with_batch_size(8)
            .with_base_url("http://localhost:8080/v1")
            .with_api_key_env("LOCAL_KEY");

        assert_eq!(config.provider, ProviderKind::Hashing);
        assert_eq!(config.dimensions, Some(32));
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.api_key_env, "LOCAL_KEY");
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(EmbedConfig::hashing(0).validate().is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let config = EmbedConfig::default().with_api_key_env("VAULT_AI_TEST_UNSET_KEY_VAR");
        match config.api_key() {
            Err(EmbedError::MissingApiKey { var }) => {
                assert_eq!(var, "VAULT_AI_TEST_UNSET_KEY_VAR")
            }
            other => panic!("expected MissingApiKey, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(ProviderKind::OpenAi.as_str(), "openai");
        assert_eq!(ProviderKind::FastEmbed.as_str(), "fastembed");
        assert_eq!(ProviderKind::Hashing.as_str(), "hashing");
    }
}
