//! Similarity search
//!
//! Filtered k-nearest-neighbor retrieval over a [`VectorIndex`].
//!
//! Candidates are first restricted by the metadata [`Filter`], then scored
//! against the query vector and reduced to the top k with a bounded heap
//! (O(n log k)). Results are ordered by descending score, ties broken by
//! ascending document id, so repeated searches always agree.
//!
//! # Usage
//!
//! ```ignore
//! use ragchain_lib::search::{SearchRequest, SimilarityEngine};
//!
//! let engine = SimilarityEngine::default();
//! let results = engine.search(&index, &query_vector, 5, None)?;
//!
//! let request = SearchRequest::new(5)
//!     .with_filter(Filter::new().gte("year", 2021))
//!     .with_min_score(0.2);
//! let results = engine.search_with(&index, &query_vector, &request)?;
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::{check_embedding, Embedder};
use crate::error::SearchError;
use crate::index::{Document, Filter, IndexView, VectorIndex};

/// Similarity metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Similarity {
    /// Cosine similarity (normalized dot product), in [-1, 1]
    #[default]
    Cosine,
    /// Raw dot product
    DotProduct,
    /// Euclidean distance mapped to `1 / (1 + distance)`, in (0, 1]
    Euclidean,
}

impl Similarity {
    /// Score `b` against `a`. Higher is more similar.
    ///
    /// Sums are accumulated in `f64`, so any finite `f32` inputs give a
    /// well-defined score.
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::DotProduct => dot(a, b) as f32,
            Self::Euclidean => {
                let distance = a
                    .iter()
                    .zip(b)
                    .map(|(&x, &y)| {
                        let d = f64::from(x) - f64::from(y);
                        d * d
                    })
                    .sum::<f64>()
                    .sqrt();
                (1.0 / (1.0 + distance)) as f32
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum()
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction. A
/// zero-magnitude vector scores 0 against anything.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32
}

/// A search result with similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched document
    pub document: Document,
    /// Similarity score (higher is more similar)
    pub score: f32,
    /// Position in the result list, starting at 0
    pub rank: usize,
}

/// Parameters of a search beyond the query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Maximum number of results, must be > 0
    pub k: usize,
    /// Metadata filter applied before ranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Drop candidates scoring below this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            filter: None,
            min_score: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// A scored candidate. Orders by score, then by *descending* id, so that
/// "greater" always means "ranks earlier".
struct Candidate<'a> {
    score: f32,
    document: &'a Document,
}

impl Candidate<'_> {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.document.id.cmp(&self.document.id))
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// -0.0 ranks with 0.0, NaN ranks last. Scores of finite vectors are
/// never NaN, so this only guards the ordering invariant.
fn rankable(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score + 0.0
    }
}

/// Stateless k-NN search over a [`VectorIndex`].
///
/// The default engine ranks with the metric in the searched index's
/// [`IndexConfig`](crate::index::IndexConfig). [`SimilarityEngine::new`]
/// overrides it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityEngine {
    similarity: Option<Similarity>,
}

impl SimilarityEngine {
    #[must_use]
    pub fn new(similarity: Similarity) -> Self {
        Self {
            similarity: Some(similarity),
        }
    }

    /// The overriding metric, if any
    #[must_use]
    pub fn similarity(&self) -> Option<Similarity> {
        self.similarity
    }

    /// Return up to `k` documents most similar to `query`.
    ///
    /// Fewer than `k` results is not an error: it means fewer candidates
    /// passed the filter.
    pub fn search<E: Embedder>(
        &self,
        index: &VectorIndex<E>,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.search_view(&index.read(), query, k, filter, None)
    }

    /// Search with a full [`SearchRequest`].
    pub fn search_with<E: Embedder>(
        &self,
        index: &VectorIndex<E>,
        query: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.search_view(
            &index.read(),
            query,
            request.k,
            request.filter.as_ref(),
            request.min_score,
        )
    }

    /// Search an already locked index.
    pub fn search_view(
        &self,
        view: &IndexView<'_>,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
        min_score: Option<f32>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if k == 0 {
            return Err(SearchError::InvalidK);
        }
        check_embedding(query).map_err(SearchError::InvalidQuery)?;

        let Some(dimension) = view.dimension() else {
            // nothing has ever been indexed
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(SearchError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let similarity = self.similarity.unwrap_or(view.similarity());

        // min-heap of the best k seen so far; the root is the current worst
        let mut heap: BinaryHeap<Reverse<Candidate<'_>>> = BinaryHeap::with_capacity(k.min(view.len()));
        let mut candidates = 0usize;

        for document in view.documents() {
            if filter.is_some_and(|f| !f.matches(&document.metadata)) {
                continue;
            }
            if document.vector.len() != query.len() {
                return Err(SearchError::DimensionMismatch {
                    expected: document.vector.len(),
                    actual: query.len(),
                });
            }

            let score = rankable(similarity.score(query, &document.vector));
            if min_score.is_some_and(|min| score < min) {
                continue;
            }
            candidates += 1;

            let candidate = Candidate { score, document };
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if let Some(mut worst) = heap.peek_mut() {
                if candidate > worst.0 {
                    *worst = Reverse(candidate);
                }
            }
        }

        let mut ranked: Vec<Candidate<'_>> = heap.into_iter().map(|Reverse(c)| c).collect();
        ranked.sort_unstable_by(|a, b| b.cmp(a));

        debug!(
            k,
            candidates,
            returned = ranked.len(),
            similarity = ?similarity,
            "similarity search"
        );

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(rank, c)| SearchResult {
                document: c.document.clone(),
                score: c.score,
                rank,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Embedding;
    use crate::error::EmbeddingError;
    use crate::index::filter::strategies::arb_condition;
    use crate::index::{IndexConfig, Metadata, MetadataValue};
    use proptest::prelude::*;

    /// Parses "x,y,z" into a vector, so tests choose vectors through the text.
    fn literal_embedder(text: &str) -> Result<Embedding, EmbeddingError> {
        text.split(',')
            .map(|x| x.trim().parse::<f32>().map_err(|e| EmbeddingError::Failed(e.to_string())))
            .collect()
    }

    type LiteralFn = fn(&str) -> Result<Embedding, EmbeddingError>;
    type LiteralIndex = VectorIndex<LiteralFn>;

    fn make_index(docs: &[(&str, &str)]) -> LiteralIndex {
        let index = VectorIndex::new(literal_embedder as LiteralFn);
        for (id, vector) in docs {
            index.add(*id, *vector, Metadata::new()).unwrap();
        }
        index
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.id.as_str()).collect()
    }

    #[test]
    fn test_cosine_scores() {
        let cases: [(&[f32], &[f32], f32); 6] = [
            (&[2.0, 0.0, 0.0], &[5.0, 0.0, 0.0], 1.0),
            (&[0.0, 3.0, 0.0], &[0.0, 0.0, -1.0], 0.0),
            (&[1.0, 1.0, 0.0], &[-4.0, -4.0, 0.0], -1.0),
            (&[3.0, 4.0, 0.0], &[4.0, 3.0, 0.0], 0.96),
            (&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0], 0.0),
            (&[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0], 0.0),
        ];
        for (a, b, expected) in cases {
            let score = cosine_similarity(a, b);
            assert!((score - expected).abs() < 1e-6, "{a:?} vs {b:?}: {score}");
        }
    }

    #[test]
    fn test_large_components_keep_scores_finite() {
        let big = [3e19_f32, 0.0];
        let orth = [0.0_f32, 1.0];

        assert_eq!(cosine_similarity(&big, &big), 1.0);
        assert_eq!(cosine_similarity(&big, &orth), 0.0);
        assert_eq!(cosine_similarity(&[f32::MAX, f32::MAX], &[-f32::MAX, -f32::MAX]), -1.0);
        assert_eq!(Similarity::Euclidean.score(&big, &big), 1.0);
        assert!(Similarity::Euclidean.score(&big, &orth) > 0.0);
        assert_eq!(Similarity::DotProduct.score(&big, &big), f32::INFINITY);

        let index = VectorIndex::new(literal_embedder as LiteralFn);
        index.add("a-big", "3e19, 0", Metadata::new()).unwrap();
        index.add("b-orth", "0, 1", Metadata::new()).unwrap();

        let results = SimilarityEngine::default().search(&index, &big, 2, None).unwrap();
        assert_eq!(ids(&results), vec!["a-big", "b-orth"]);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn test_other_metrics() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        assert_eq!(Similarity::DotProduct.score(&a, &b), 11.0);
        assert_eq!(Similarity::Euclidean.score(&a, &a), 1.0);
        let far = Similarity::Euclidean.score(&a, &b);
        assert!((far - 1.0 / (1.0 + 8f32.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_serde_names() {
        assert_eq!(
            serde_json::to_string(&Similarity::DotProduct).unwrap(),
            "\"dotProduct\""
        );
        let parsed: Similarity = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(parsed, Similarity::Euclidean);
    }

    #[test]
    fn test_search_returns_sorted() {
        let index = make_index(&[
            ("1", "0, 1, 0"),     // orthogonal to query
            ("2", "1, 0, 0"),     // identical to query
            ("3", "0.5, 0.5, 0"), // somewhat similar
        ]);

        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0, 0.0], 3, None)
            .unwrap();

        assert_eq!(ids(&results), vec!["2", "3", "1"]);
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_respects_k() {
        let index = make_index(&[("1", "1, 0"), ("2", "0.9, 0.1"), ("3", "0.8, 0.2")]);

        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();

        assert_eq!(ids(&results), vec!["1", "2"]);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = make_index(&[("1", "1, 0")]);
        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 100, None)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_search() {
        let index = make_index(&[]);
        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 5, None)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_zero_k_rejected() {
        let index = make_index(&[("1", "1, 0")]);
        let err = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 0, None)
            .unwrap_err();
        assert_eq!(err, SearchError::InvalidK);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = make_index(&[("1", "1, 0")]);
        let err = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0, 0.0], 1, None)
            .unwrap_err();
        assert_eq!(err, SearchError::DimensionMismatch { expected: 2, actual: 3 });
    }

    #[test]
    fn test_invalid_query_vector() {
        let index = make_index(&[("1", "1, 0")]);
        let engine = SimilarityEngine::default();
        assert_eq!(
            engine.search(&index, &[], 1, None).unwrap_err(),
            SearchError::InvalidQuery(EmbeddingError::EmptyOutput)
        );
        assert_eq!(
            engine.search(&index, &[f32::NAN, 0.0], 1, None).unwrap_err(),
            SearchError::InvalidQuery(EmbeddingError::NonFinite { position: 0 })
        );
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        // parallel vectors with exact norms, so all three score exactly 1.0
        let index = make_index(&[("c", "3, 4"), ("a", "6, 8"), ("b", "9, 12"), ("d", "4, 3")]);
        let engine = SimilarityEngine::default();

        for _ in 0..5 {
            let results = engine.search(&index, &[3.0, 4.0], 3, None).unwrap();
            assert!(results.iter().all(|r| r.score == 1.0));
            assert_eq!(ids(&results), vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn test_zero_vector_ranks_last() {
        let index = make_index(&[("zero", "0, 0"), ("near", "1, 0.1"), ("far", "0.1, 1")]);

        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 3, None)
            .unwrap();

        assert_eq!(ids(&results), vec!["near", "far", "zero"]);
        assert_eq!(results[2].score, 0.0);
    }

    #[test]
    fn test_negative_scores_rank_below_zero_vector() {
        let index = make_index(&[("zero", "0, 0"), ("opposite", "-1, 0")]);

        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();

        assert_eq!(ids(&results), vec!["zero", "opposite"]);
    }

    #[test]
    fn test_filter_applies_before_ranking() {
        let index = VectorIndex::new(literal_embedder as LiteralFn);
        let year = |y: i64| Metadata::from([("year".to_string(), MetadataValue::Integer(y))]);
        index.add("best", "1, 0", year(2019)).unwrap();
        index.add("good", "0.9, 0.1", year(2022)).unwrap();
        index.add("okay", "0.5, 0.5", year(2023)).unwrap();

        let filter = Filter::new().gte("year", 2021);
        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, Some(&filter))
            .unwrap();

        // still k results: the filtered-out best match does not use up a slot
        assert_eq!(ids(&results), vec!["good", "okay"]);
    }

    #[test]
    fn test_min_score() {
        let index = make_index(&[("1", "1, 0"), ("2", "0, 1"), ("3", "1, 1")]);
        let request = SearchRequest::new(3).with_min_score(0.5);

        let results = SimilarityEngine::default()
            .search_with(&index, &[1.0, 0.0], &request)
            .unwrap();

        assert_eq!(ids(&results), vec!["1", "3"]);
    }

    #[test]
    fn test_dot_product_engine() {
        let index = make_index(&[("short", "1, 0"), ("long", "5, 5")]);

        let cosine = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();
        let dot = SimilarityEngine::new(Similarity::DotProduct)
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();

        assert_eq!(ids(&cosine), vec!["short", "long"]);
        assert_eq!(ids(&dot), vec!["long", "short"]);
    }

    #[test]
    fn test_default_engine_uses_index_metric() {
        let config = IndexConfig::default().with_similarity(Similarity::DotProduct);
        let index = VectorIndex::with_config(literal_embedder as LiteralFn, config).unwrap();
        index.add("short", "1, 0", Metadata::new()).unwrap();
        index.add("long", "5, 5", Metadata::new()).unwrap();

        let configured = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();
        assert_eq!(ids(&configured), vec!["long", "short"]);
        assert_eq!(configured[0].score, 5.0);

        let overridden = SimilarityEngine::new(Similarity::Cosine)
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();
        assert_eq!(ids(&overridden), vec!["short", "long"]);
    }

    #[test]
    fn test_removed_document_not_returned() {
        let index = make_index(&[("1", "1, 0"), ("2", "0.9, 0.1")]);
        index.remove("1").unwrap();

        let results = SimilarityEngine::default()
            .search(&index, &[1.0, 0.0], 2, None)
            .unwrap();
        assert_eq!(ids(&results), vec!["2"]);
    }

    #[test]
    fn test_search_request_serde() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"k": 4, "filter": [{"key": "year", "op": "lt", "value": 2020}]}"#)
                .unwrap();
        assert_eq!(request.k, 4);
        assert_eq!(request.filter, Some(Filter::new().lt("year", 2020)));
        assert_eq!(request.min_score, None);
    }

    fn arb_docs() -> impl Strategy<Value = Vec<[i8; 3]>> {
        // small integer components so exact score ties actually happen
        prop::collection::vec(prop::array::uniform3(-3i8..=3), 1..24)
    }

    fn literal(v: &[i8; 3]) -> String {
        format!("{},{},{}", v[0], v[1], v[2])
    }

    fn index_of(docs: &[[i8; 3]]) -> LiteralIndex {
        let index = VectorIndex::new(literal_embedder as LiteralFn);
        for (i, v) in docs.iter().enumerate() {
            let parity = Metadata::from([("even".to_string(), MetadataValue::Boolean(i % 2 == 0))]);
            index.add(format!("doc-{i:02}"), literal(v), parity).unwrap();
        }
        index
    }

    /// Keys present on every document, plus one that never is.
    fn arb_key() -> BoxedStrategy<String> {
        prop::sample::select(vec!["even", "n", "x", "tag", "missing"])
            .prop_map(str::to_string)
            .boxed()
    }

    /// Values of every type, drawn from ranges the metadata actually hits.
    fn arb_value() -> BoxedStrategy<MetadataValue> {
        prop_oneof![
            any::<bool>().prop_map(MetadataValue::Boolean),
            (-1i64..6).prop_map(MetadataValue::Integer),
            (-2i64..12).prop_map(|x| MetadataValue::Float(x as f64 / 2.0)),
            prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(MetadataValue::from),
        ]
        .boxed()
    }

    fn tagged_index_of(docs: &[[i8; 3]]) -> LiteralIndex {
        let index = VectorIndex::new(literal_embedder as LiteralFn);
        for (i, v) in docs.iter().enumerate() {
            let metadata = Metadata::from([
                ("even".to_string(), MetadataValue::Boolean(i % 2 == 0)),
                ("n".to_string(), MetadataValue::Integer((i % 5) as i64)),
                ("x".to_string(), MetadataValue::Float(i as f64 / 4.0)),
                ("tag".to_string(), MetadataValue::from(["a", "b", "c"][i % 3])),
            ]);
            index.add(format!("doc-{i:02}"), literal(v), metadata).unwrap();
        }
        index
    }

    proptest! {
        #[test]
        fn prop_top_k_matches_full_sort(
            docs in arb_docs(),
            query in prop::array::uniform3(-3i8..=3).prop_filter("non-zero query", |q| q.iter().any(|&x| x != 0)),
            k_seed in 1usize..64,
        ) {
            let index = index_of(&docs);
            let query: Vec<f32> = query.iter().map(|&x| f32::from(x)).collect();
            let k = 1 + k_seed % docs.len();

            let results = SimilarityEngine::default().search(&index, &query, k, None).unwrap();
            prop_assert_eq!(results.len(), k);

            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].document.id < pair[1].document.id);
                }
            }

            let mut reference: Vec<(f32, String)> = index
                .read()
                .documents()
                .map(|d| (rankable(cosine_similarity(&query, &d.vector)), d.id.clone()))
                .collect();
            reference.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            let expected: Vec<&str> = reference.iter().take(k).map(|(_, id)| id.as_str()).collect();
            prop_assert_eq!(ids(&results), expected);
        }

        #[test]
        fn prop_filtered_results_satisfy_filter(
            docs in arb_docs(),
            conditions in prop::collection::vec(arb_condition(arb_key(), arb_value()), 0..4),
        ) {
            let index = tagged_index_of(&docs);
            let filter = conditions.into_iter().fold(Filter::new(), Filter::and);

            let results = SimilarityEngine::default()
                .search(&index, &[1.0, 0.0, 0.0], docs.len(), Some(&filter))
                .unwrap();

            let expected = index.read().documents().filter(|d| filter.matches(&d.metadata)).count();
            prop_assert_eq!(results.len(), expected);
            for result in &results {
                prop_assert!(filter.matches(&result.document.metadata));
            }
        }

        #[test]
        fn prop_removed_documents_never_returned(docs in arb_docs(), victim_seed in any::<usize>()) {
            let index = index_of(&docs);
            let victim = format!("doc-{:02}", victim_seed % docs.len());
            prop_assert!(index.remove(&victim).unwrap());

            let results = SimilarityEngine::default()
                .search(&index, &[1.0, 1.0, 1.0], docs.len(), None)
                .unwrap();
            prop_assert_eq!(results.len(), docs.len() - 1);
            prop_assert!(results.iter().all(|r| r.document.id != victim));
        }

        #[test]
        fn prop_repeated_add_is_idempotent(docs in arb_docs()) {
            let once = index_of(&docs);
            let twice = index_of(&docs);
            for (i, v) in docs.iter().enumerate() {
                let doc = twice.get(&format!("doc-{i:02}")).unwrap();
                twice.add(doc.id, literal(v), doc.metadata).unwrap();
            }

            let engine = SimilarityEngine::default();
            let query = [1.0, -1.0, 0.5];
            prop_assert_eq!(
                engine.search(&once, &query, docs.len(), None).unwrap(),
                engine.search(&twice, &query, docs.len(), None).unwrap()
            );
        }
    }
}
