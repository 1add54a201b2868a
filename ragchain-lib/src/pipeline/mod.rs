//! Retrieval pipeline
//!
//! Embeds a natural-language query, searches the shared [`VectorIndex`], and
//! returns documents in rank order. A pipeline keeps no state between calls
//! beyond its index and embedder handles; in particular query embeddings are
//! not cached.
//!
//! # Usage
//!
//! ```ignore
//! use ragchain_lib::pipeline::{PromptTemplate, RetrievalPipeline, Stage};
//!
//! let pipeline = RetrievalPipeline::new(Arc::clone(&index));
//! let docs = pipeline.retrieve("What city did I visit last?", 5, None)?;
//!
//! // As a chain: retriever -> prompt -> chat model
//! let chain = pipeline
//!     .as_retriever(SearchRequest::new(5))
//!     .with_question()
//!     .then(PromptTemplate::default())
//!     .then(|prompt: String| -> Result<String, PipelineError> { chat(prompt) });
//! let answer = chain.run("What city did I visit last?".to_string())?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::embed::{check_embedding, Embedder, Embedding};
use crate::error::PipelineError;
use crate::index::{Document, Filter, VectorIndex};
use crate::search::{SearchRequest, SearchResult, SimilarityEngine};

mod chain;

pub use chain::*;

/// Query-to-documents retrieval over a shared [`VectorIndex`].
pub struct RetrievalPipeline<E> {
    index: Arc<VectorIndex<E>>,
    embedder: Arc<E>,
    engine: SimilarityEngine,
}

impl<E> Clone for RetrievalPipeline<E> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            embedder: Arc::clone(&self.embedder),
            engine: self.engine,
        }
    }
}

impl<E: Embedder> RetrievalPipeline<E> {
    /// Create a pipeline that embeds queries with the index's own embedder
    /// and ranks with the index's configured similarity.
    #[must_use]
    pub fn new(index: Arc<VectorIndex<E>>) -> Self {
        Self {
            embedder: Arc::clone(index.embedder()),
            engine: SimilarityEngine::default(),
            index,
        }
    }

    /// Rank with a different engine.
    #[must_use]
    pub fn with_engine(mut self, engine: SimilarityEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Return up to `k` documents for `query`, best first.
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Document>, PipelineError> {
        let query_embedding = self.embed_query(query)?;
        let results = self.engine.search(&self.index, &query_embedding, k, filter)?;

        debug!(k, returned = results.len(), "retrieved documents");
        Ok(results.into_iter().map(|r| r.document).collect())
    }

    /// Like [`retrieve`](Self::retrieve), keeping scores and ranks.
    pub fn retrieve_with_scores(
        &self,
        query: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        let query_embedding = self.embed_query(query)?;
        let results = self.engine.search_with(&self.index, &query_embedding, request)?;

        debug!(k = request.k, returned = results.len(), "retrieved scored documents");
        Ok(results)
    }

    /// The embedding call is the only point where a pipeline waits on the outside world.
    fn embed_query(&self, query: &str) -> Result<Embedding, PipelineError> {
        let embedding = self
            .embedder
            .embed_query(query)
            .map_err(PipelineError::Embedding)?;
        check_embedding(&embedding).map_err(PipelineError::Embedding)?;
        Ok(embedding)
    }

    /// Fix the search parameters and expose retrieval as a [`Stage`].
    #[must_use]
    pub fn as_retriever(&self, request: SearchRequest) -> Retriever<E> {
        Retriever {
            pipeline: self.clone(),
            request,
        }
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex<E>> {
        &self.index
    }
}

/// A [`RetrievalPipeline`] with fixed search parameters.
///
/// Implements `Stage<String>` with `Vec<Document>` output, so it chains
/// like any other stage.
pub struct Retriever<E> {
    pipeline: RetrievalPipeline<E>,
    request: SearchRequest,
}

impl<E> Clone for Retriever<E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            request: self.request.clone(),
        }
    }
}

impl<E: Embedder> Retriever<E> {
    pub fn invoke(&self, query: &str) -> Result<Vec<Document>, PipelineError> {
        let results = self.pipeline.retrieve_with_scores(query, &self.request)?;
        Ok(results.into_iter().map(|r| r.document).collect())
    }

    /// Pass the question along with the documents, ready for a prompt stage.
    #[must_use]
    pub fn with_question(self) -> WithQuestion<Self> {
        WithQuestion::new(self)
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }
}

impl<E: Embedder> Stage<String> for Retriever<E> {
    type Out = Vec<Document>;

    fn run(&self, query: String) -> Result<Vec<Document>, PipelineError> {
        self.invoke(&query)
    }
}
