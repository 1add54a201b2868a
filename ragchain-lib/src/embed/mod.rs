//! Text embedding
//!
//! The embedding function is an external collaborator: anything that turns
//! text into a fixed-length vector. Closures implement [`Embedder`] directly,
//! so a remote API client or a test stub can be plugged in without a wrapper
//! type. With the `bge` feature, [`BgeEmbedder`] runs BAAI/bge-large-en-v1.5
//! locally via fastembed (ONNX runtime).
//!
//! # Usage
//!
//! ```ignore
//! use ragchain_lib::embed::{Embedder, Embedding};
//! use ragchain_lib::error::EmbeddingError;
//!
//! let embedder = |text: &str| -> Result<Embedding, EmbeddingError> {
//!     Ok(vec![text.len() as f32, 1.0])
//! };
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["In 2023, I visited Paris"])?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("What city did I visit last?")?;
//! ```

use crate::error::EmbeddingError;

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
///
/// Implementations must produce the same dimensionality on every call for the
/// lifetime of an index. No timeout or retry is applied by callers in this
/// crate; an implementation backed by a network service owns its deadline.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embed a single query for searching
    ///
    /// Note: Some models (like BGE) use different prompts for queries vs documents.
    fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed(text)
    }

    /// Embed multiple documents for indexing
    ///
    /// Documents may be batched for efficiency. Output order matches input order.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Returns the embedding dimension, if known ahead of time
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Returns the model name/identifier
    fn model_name(&self) -> &str {
        "custom"
    }
}

impl<F> Embedder for F
where
    F: Fn(&str) -> Result<Embedding, EmbeddingError> + Send + Sync,
{
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self(text)
    }
}

/// Reject empty or non-finite embeddings.
pub(crate) fn check_embedding(embedding: &[f32]) -> Result<(), EmbeddingError> {
    if embedding.is_empty() {
        return Err(EmbeddingError::EmptyOutput);
    }
    match embedding.iter().position(|x| !x.is_finite()) {
        Some(position) => Err(EmbeddingError::NonFinite { position }),
        None => Ok(()),
    }
}

#[cfg(feature = "bge")]
mod bge;
#[cfg(feature = "bge")]
pub use bge::*;
