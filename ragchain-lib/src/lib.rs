//! RagChain - vector retrieval core for retrieval-augmented chat
//!
//! # Architecture
//!
//! ```text
//! Text -> Embedder -> VectorIndex
//!                         |
//! Query -> Embedder -> SimilarityEngine (filter, cosine, top-k)
//!                         |
//!                  RetrievalPipeline -> Documents -> downstream stages
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ragchain_lib::{index::{Filter, VectorIndex}, pipeline::RetrievalPipeline};
//!
//! let index = Arc::new(VectorIndex::new(embedder));
//!
//! // Index documents
//! index.add_texts(&["In 2023, I visited Paris", "In 2022, I visited New York"], None)?;
//!
//! // Retrieve
//! let pipeline = RetrievalPipeline::new(Arc::clone(&index));
//! let docs = pipeline.retrieve("What city did I visit last?", 2, None)?;
//! let recent = pipeline.retrieve("Where did I go?", 2, Some(&Filter::parse("year >= 2022")?))?;
//! ```

pub mod embed;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod search;

pub use error::{Error, Result};
