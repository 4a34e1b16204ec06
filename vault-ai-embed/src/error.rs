//! Error types for the embedding system

/// Result type for embedding operations.
///
/// Convenience alias using [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for embedding providers.
///
/// Providers return these freely; the [`EmbeddingGateway`](crate::EmbeddingGateway)
/// is the boundary where they are logged and turned into
/// [`EmbedOutcome::Failed`](crate::EmbedOutcome::Failed) instead of being
/// propagated to indexing or retrieval code.
///
/// # Error Categories
///
/// - **Configuration Errors**: missing API keys, unknown model names
/// - **Initialization Errors**: failures while loading a local model
/// - **Service Errors**: HTTP failures and malformed responses from a remote provider
/// - **Runtime Errors**: failures while a local model generates embeddings
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the configuration cannot produce a working provider
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The API key environment variable is unset or empty
    #[error("Missing API key: environment variable {var} is not set")]
    MissingApiKey { var: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport-level failure talking to a remote embedding service
    #[error("Embedding request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status
    #[error("Embedding service returned {status}: {body}")]
    Service { status: u16, body: String },

    /// The provider returned a different number of vectors than inputs
    #[error("Provider returned {got} embeddings for {expected} inputs")]
    CardinalityMismatch { expected: usize, got: usize },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
