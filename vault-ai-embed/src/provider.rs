//! Embedding provider implementations

use crate::config::{DEFAULT_HASHING_DIMENSION, EmbedConfig, ProviderKind};
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of f16 embeddings.
    ///
    /// The dimension is inferred from the first embedding vector and is 0
    /// when there are none.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations may fail however they like; callers inside this
/// workspace go through [`EmbeddingGateway`](crate::EmbeddingGateway),
/// which never lets a provider error escape.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per text, in order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CardinalityMismatch {
                expected: 1,
                got: 0,
            })
    }

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Get the model this provider embeds with
    fn model_name(&self) -> &str;
}

/// Build the provider selected by `config`.
///
/// Local models are downloaded and loaded here, so this can take a while on
/// first use of a fastembed model.
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    tracing::info!(
        "Creating {} embedding provider with model {}",
        config.provider.as_str(),
        config.model_name()
    );
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(config)?),
        ProviderKind::FastEmbed => Arc::new(FastEmbedProvider::create(config.clone()).await?),
        ProviderKind::Hashing => Arc::new(HashingProvider::new(
            config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSION),
        )),
    };
    Ok(provider)
}

fn to_f16(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
    embeddings
        .into_iter()
        .map(|embedding| embedding.into_iter().map(f16::from_f32).collect())
        .collect()
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl OpenAiProvider {
    /// Builds a client with an explicit API key.
    pub fn new(api_key: &str, config: &EmbedConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::MissingApiKey {
                var: config.api_key_env.clone(),
            });
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbedError::invalid_config("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model_name().to_string(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Builds a client reading the API key from the configured environment variable.
    pub fn from_config(config: &EmbedConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(&api_key, config)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = OpenAiEmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: OpenAiEmbeddingResponse = response.json().await?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbedError::CardinalityMismatch {
                expected: inputs.len(),
                got: parsed.data.len(),
            });
        }
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!("Requesting {} embeddings from {}", batch.len(), self.endpoint);
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(EmbeddingResult::new(to_f16(embeddings)))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Type alias for cached model entries
type ModelCacheEntry = Arc<Mutex<TextEmbedding>>;

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Map a configured model name onto one of fastembed's built-in models.
pub fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "snowflake-arctic-embed-xs" => Ok(EmbeddingModel::SnowflakeArcticEmbedXS),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(EmbedError::invalid_config(format!(
            "unknown fastembed model: {other}"
        ))),
    }
}

/// FastEmbed-based embedding provider using local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Loads (or reuses from the process-wide cache) the configured model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let model_kind = builtin_model(config.model_name())?;
        let cache_key = format!(
            "{}:{}",
            config.model_name().to_ascii_lowercase(),
            config
                .cache_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );

        let cached = get_model_cache()
            .lock()
            .map_err(|_| EmbedError::invalid_config("model cache lock poisoned"))?
            .get(&cache_key)
            .cloned();
        if let Some(model) = cached {
            tracing::info!("Using cached model for: {}", config.model_name());
            return Ok(Self { config, model });
        }

        let cache_dir = config.cache_dir.clone();
        let model_name = config.model_name().to_string();
        let model = tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
            tracing::info!("Loading embedding model: {}", model_name);
            let mut options = InitOptions::new(model_kind).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            Ok(TextEmbedding::try_new(options)?)
        })
        .await??;

        let model = Arc::new(Mutex::new(model));
        get_model_cache()
            .lock()
            .map_err(|_| EmbedError::invalid_config("model cache lock poisoned"))?
            .insert(cache_key, Arc::clone(&model));

        Ok(Self { config, model })
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        if let Ok(mut cache) = get_model_cache().lock() {
            cache.clear();
            tracing::info!("Model cache cleared");
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.config.batch_size;
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model
                .lock()
                .map_err(|_| EmbedError::invalid_config("model lock poisoned"))?;
            Ok(guard.embed(texts, Some(batch_size))?)
        })
        .await??;

        Ok(EmbeddingResult::new(
            embeddings.into_iter().map(normalized_f16).collect(),
        ))
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }
}

fn normalized_f16(embedding: Vec<f32>) -> Vec<f16> {
    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.into_iter().map(|x| f16::from_f32(x / norm)).collect()
    } else {
        embedding.into_iter().map(f16::from_f32).collect()
    }
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Every lowercase alphanumeric token is hashed with FNV into one of
/// `dimension` buckets with a hash-derived sign, and the result is
/// L2-normalized. Texts sharing vocabulary land close together, which is
/// enough for offline indexing and for tests. Whitespace-only input yields
/// the zero vector.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }
        normalized_f16(buckets)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed_sync(t)).collect();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}
