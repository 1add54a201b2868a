//! Vector index
//!
//! An in-process, insertion-ordered mapping from document id to
//! (text, metadata, vector). The index owns the embedder used for documents
//! and tracks a build generation for readiness.
//!
//! # Storage Model
//!
//! Each stored item is a [`Document`]:
//! - id: unique key, re-insertion overwrites in place
//! - text and metadata: as supplied by the caller
//! - vector: computed by the index's [`Embedder`]
//!
//! # Usage
//!
//! ```ignore
//! use ragchain_lib::index::{Metadata, VectorIndex};
//!
//! let index = VectorIndex::new(embedder);
//! index.add("paris", "In 2023, I visited Paris", Metadata::new())?;
//!
//! // Managed indexes become queryable asynchronously; callers poll
//! while !index.is_ready() {
//!     std::thread::sleep(interval);
//! }
//! ```

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embed::{check_embedding, Embedder, Embedding};
use crate::error::{ConfigError, EmbeddingError, IndexError};
use crate::search::Similarity;

pub mod filter;

pub use filter::{Condition, Filter, FilterValue, Operator};

/// A typed scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Document metadata, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

/// An indexed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier within an index
    pub id: String,
    /// The text that was embedded
    pub text: String,
    /// Arbitrary scalar metadata, used by filters
    pub metadata: Metadata,
    /// Embedding of `text`
    pub vector: Embedding,
}

/// Index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index name, used in logs
    pub name: String,
    /// Vector dimension. `None` takes it from the embedder, or from the first document.
    pub dimension: Option<usize>,
    /// Similarity metric searches over this index should use
    pub similarity: Similarity,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            dimension: None,
            similarity: Similarity::default(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }
}

struct IndexState {
    documents: IndexMap<String, Document>,
    dimension: Option<usize>,
    generation: u64,
}

impl IndexState {
    /// Fix the dimension on first use, then hold every vector to it.
    fn accept_dimension(&mut self, actual: usize) -> Result<(), ConfigError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(ConfigError::DimensionMismatch { expected, actual })
            }
            Some(_) => Ok(()),
            None => {
                self.dimension = Some(actual);
                Ok(())
            }
        }
    }
}

/// Read access to the index contents.
///
/// Holds the index's read lock: mutations wait until the view is dropped.
pub struct IndexView<'a> {
    state: RwLockReadGuard<'a, IndexState>,
    similarity: Similarity,
}

impl IndexView<'_> {
    /// Documents in insertion order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.state.documents.values()
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.state.dimension
    }

    /// Metric configured for the index
    #[must_use]
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.documents.is_empty()
    }
}

/// Marks a build as pending until dropped.
struct PendingBuild<'a>(&'a AtomicUsize);

impl<'a> PendingBuild<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingBuild<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory vector index with reader/writer exclusion.
///
/// Embedding happens outside the lock; only the insert itself is exclusive.
/// Searches hold the read lock for the whole scan, so they never observe a
/// half-applied mutation.
pub struct VectorIndex<E> {
    config: IndexConfig,
    embedder: Arc<E>,
    state: RwLock<IndexState>,
    pending: AtomicUsize,
}

impl<E: Embedder> VectorIndex<E> {
    /// Create an empty index with the default configuration.
    #[must_use]
    pub fn new(embedder: E) -> Self {
        let dimension = embedder.dimension();
        Self::build(Arc::new(embedder), IndexConfig::default(), dimension)
    }

    /// Create an empty index, validating `config` against the embedder.
    pub fn with_config(embedder: E, config: IndexConfig) -> Result<Self, ConfigError> {
        Self::with_shared_embedder(Arc::new(embedder), config)
    }

    /// Like [`with_config`](Self::with_config) for an embedder shared with other indexes.
    pub fn with_shared_embedder(embedder: Arc<E>, config: IndexConfig) -> Result<Self, ConfigError> {
        let dimension = match (config.dimension, embedder.dimension()) {
            (Some(0), _) => return Err(ConfigError::ZeroDimension),
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(ConfigError::DimensionMismatch { expected, actual });
            }
            (configured, reported) => configured.or(reported),
        };
        Ok(Self::build(embedder, config, dimension))
    }

    fn build(embedder: Arc<E>, config: IndexConfig, dimension: Option<usize>) -> Self {
        Self {
            config,
            embedder,
            state: RwLock::new(IndexState {
                documents: IndexMap::new(),
                dimension,
                generation: 0,
            }),
            pending: AtomicUsize::new(0),
        }
    }

    /// Embed `text` and insert it under `id`, replacing any previous document.
    ///
    /// Embedding failures are returned as-is, never retried. A vector whose
    /// length differs from the index dimension is a fatal configuration error.
    pub fn add(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> Result<(), IndexError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IndexError::EmptyId);
        }
        let text = text.into();

        let _build = PendingBuild::start(&self.pending);

        let vector = self
            .embedder
            .embed(&text)
            .and_then(|vector| check_embedding(&vector).map(|()| vector))
            .map_err(|source| {
                warn!(index = %self.config.name, %id, error = %source, "embedding rejected");
                IndexError::Embedding { id: id.clone(), source }
            })?;

        let mut state = self.state.write();
        state.accept_dimension(vector.len())?;

        let replaced = state
            .documents
            .insert(id.clone(), Document { id: id.clone(), text, metadata, vector })
            .is_some();
        state.generation += 1;

        debug!(
            index = %self.config.name,
            %id,
            replaced,
            generation = state.generation,
            "document added"
        );
        Ok(())
    }

    /// Embed a batch of texts and insert them under content-derived ids.
    ///
    /// Returns the ids in input order. The whole batch is validated before
    /// anything is inserted, so a failure leaves the index untouched.
    pub fn add_texts(
        &self,
        texts: &[&str],
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<String>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let metadatas = match metadatas {
            Some(m) if m.len() != texts.len() => {
                return Err(IndexError::BatchLength {
                    texts: texts.len(),
                    metadatas: m.len(),
                });
            }
            Some(m) => m,
            None => vec![Metadata::new(); texts.len()],
        };

        let _build = PendingBuild::start(&self.pending);

        let ids: Vec<String> = texts.iter().map(|text| generate_id(text)).collect();
        let vectors = self.embed_batch(texts, &ids)?;

        let mut state = self.state.write();
        let expected = state.dimension.unwrap_or(vectors[0].len());
        if let Some(vector) = vectors.iter().find(|v| v.len() != expected) {
            return Err(ConfigError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }
        state.dimension = Some(expected);

        for (((id, text), metadata), vector) in ids.iter().zip(texts).zip(metadatas).zip(vectors) {
            state.documents.insert(
                id.clone(),
                Document {
                    id: id.clone(),
                    text: text.to_string(),
                    metadata,
                    vector,
                },
            );
        }
        state.generation += 1;

        debug!(
            index = %self.config.name,
            count = ids.len(),
            generation = state.generation,
            "batch added"
        );
        Ok(ids)
    }

    fn embed_batch(&self, texts: &[&str], ids: &[String]) -> Result<Vec<Embedding>, IndexError> {
        let vectors = self
            .embedder
            .embed_documents(texts)
            .map_err(|source| IndexError::BatchEmbedding {
                count: texts.len(),
                source,
            })?;

        if vectors.len() != texts.len() {
            return Err(IndexError::BatchEmbedding {
                count: texts.len(),
                source: EmbeddingError::Failed(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )),
            });
        }

        for (id, vector) in ids.iter().zip(&vectors) {
            check_embedding(vector).map_err(|source| IndexError::Embedding {
                id: id.clone(),
                source,
            })?;
        }
        Ok(vectors)
    }

    /// Remove a document. Returns whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool, IndexError> {
        let mut state = self.state.write();
        let existed = state.documents.shift_remove(id).is_some();
        if existed {
            state.generation += 1;
        }
        debug!(index = %self.config.name, %id, existed, "document removed");
        Ok(existed)
    }

    /// Remove every document. The dimension stays fixed.
    pub fn clear(&self) {
        let mut state = self.state.write();
        if !state.documents.is_empty() {
            state.documents.clear();
            state.generation += 1;
        }
    }

    /// True once at least one document has been added and no build is pending.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.state.read().generation >= 1
    }

    /// Number of mutations applied so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.state.read().documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().dimension
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.state.read().documents.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().documents.contains_key(id)
    }

    /// Document ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.state.read().documents.keys().cloned().collect()
    }

    /// Lock the index for reading.
    pub fn read(&self) -> IndexView<'_> {
        IndexView {
            state: self.state.read(),
            similarity: self.config.similarity,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Returns the embedder used for documents.
    #[must_use]
    pub fn embedder(&self) -> &Arc<E> {
        &self.embedder
    }
}

fn generate_id(string: &str) -> String {
    let mut hasher = DefaultHasher::new();
    string.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
