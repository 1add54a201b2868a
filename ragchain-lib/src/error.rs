//! Error types for RagChain

use thiserror::Error;

/// Result type alias for RagChain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Any error a RagChain operation can produce
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Filter(#[from] FilterParseError),
}

/// Failure of the external embedding function
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// The model or service failed to produce an embedding
    #[error("embedding failed: {0}")]
    Failed(String),

    /// The embedder returned an empty vector
    #[error("embedder returned an empty vector")]
    EmptyOutput,

    /// The embedder returned NaN or infinity
    #[error("embedder returned a non-finite value at position {position}")]
    NonFinite { position: usize },
}

impl EmbeddingError {
    /// Whether a caller-side retry policy may try again.
    ///
    /// Malformed output is deterministic for a given input, so only
    /// outright failures are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Fatal setup errors. Never recovered from inside the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("dimension mismatch: index expects {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index dimension must be greater than zero")]
    ZeroDimension,
}

/// Errors from [`VectorIndex`](crate::index::VectorIndex) mutations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to embed document '{id}': {source}")]
    Embedding {
        id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("failed to embed batch of {count} documents: {source}")]
    BatchEmbedding {
        count: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("document id must not be empty")]
    EmptyId,

    /// `add_texts` was given a metadata list of a different length
    #[error("got {texts} texts but {metadatas} metadata entries")]
    BatchLength { texts: usize, metadatas: usize },
}

/// Errors from [`SimilarityEngine`](crate::search::SimilarityEngine)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("k must be greater than zero")]
    InvalidK,

    /// Query vector inconsistent with the index dimensionality
    #[error("dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid query vector: {0}")]
    InvalidQuery(EmbeddingError),
}

/// Errors from [`RetrievalPipeline`](crate::pipeline::RetrievalPipeline) and chained stages
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to embed query: {0}")]
    Embedding(#[source] EmbeddingError),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// A downstream stage (prompt construction, chat model, ...) failed
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

impl PipelineError {
    /// Convenience constructor for caller-supplied stages.
    pub fn stage(stage: impl Into<String>, message: impl ToString) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}

/// Failed to parse the textual filter syntax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid filter at byte {position}: {message}")]
pub struct FilterParseError {
    pub position: usize,
    pub message: String,
}

impl FilterParseError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}
