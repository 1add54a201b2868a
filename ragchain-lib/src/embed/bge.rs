use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use crate::embed::{Embedder, Embedding};
use crate::error::EmbeddingError;

/// BGE embedder using BAAI/bge-large-en-v1.5.
///
/// Uses fastembed for ONNX-based inference. This model produces 1024-dimensional
/// embeddings and supports up to 512 tokens per input.
pub struct BgeEmbedder {
    model: Mutex<TextEmbedding>,
}

impl BgeEmbedder {
    /// Create a new BGE embedder.
    ///
    /// Downloads the model on first use (~1.2GB).
    pub fn new() -> Result<Self, EmbeddingError> {
        let opts = InitOptions::new(EmbeddingModel::BGELargeENV15)
            .with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self { model: Mutex::new(model) })
            .map_err(|e| EmbeddingError::Failed(e.to_string()))
    }
}

impl Embedder for BgeEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_documents(&[text])?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyOutput)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        // BGE uses a special prompt prefix for queries to improve retrieval
        let query_text = format!("Represent this sentence for searching relevant passages: {text}");

        self.model
            .lock()
            .embed(vec![query_text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyOutput)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.model
            .lock()
            .embed(texts, None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))
    }

    fn dimension(&self) -> Option<usize> {
        Some(1024)
    }

    fn model_name(&self) -> &str {
        "BAAI/bge-large-en-v1.5"
    }
}
