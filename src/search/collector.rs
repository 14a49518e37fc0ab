//! Top-k collection of search hits.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

/// Sort order for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (lowest to highest).
    Asc,
    /// Descending order (highest to lowest).
    #[default]
    Desc,
}

/// Field to sort search results by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortField {
    /// Sort by relevance score (default).
    #[default]
    Score,
    /// Sort by a numeric document value. Documents without the value sort last.
    Field {
        /// Field name to sort by.
        name: String,
        /// Sort order.
        order: SortOrder,
    },
}

impl SortField {
    /// Sort by a numeric value.
    pub fn field<S: Into<String>>(name: S, order: SortOrder) -> Self {
        SortField::Field {
            name: name.into(),
            order,
        }
    }

    /// Name of the value field, if sorting by one.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            SortField::Score => None,
            SortField::Field { name, .. } => Some(name),
        }
    }

    fn key(&self, score: f32, sort_value: Option<f64>) -> f64 {
        match self {
            SortField::Score => score as f64,
            SortField::Field { order, .. } => match (sort_value, order) {
                (Some(value), SortOrder::Desc) => value,
                (Some(value), SortOrder::Asc) => -value,
                (None, _) => f64::NEG_INFINITY,
            },
        }
    }
}

/// A search hit with a global doc id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The document ID.
    pub doc_id: u64,
    /// The relevance score.
    pub score: f32,
    /// The sort value, when sorting by a field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_value: Option<f64>,
}

/// Ranked hits of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// Total number of matching documents.
    pub total_hits: u64,
    /// The hits, best first.
    pub hits: Vec<SearchHit>,
}

impl TopDocs {
    /// Maximum score in the hits.
    pub fn max_score(&self) -> f32 {
        self.hits
            .iter()
            .map(|hit| hit.score)
            .fold(0.0, f32::max)
    }
}

/// A hit in the heap, ordered so that the worst hit is on top.
#[derive(Debug, Clone)]
struct RankedHit {
    key: f64,
    hit: SearchHit,
}

impl RankedHit {
    /// Higher key first, then lower doc id.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| self.hit.doc_id.cmp(&other.hit.doc_id))
    }
}

impl PartialEq for RankedHit {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for RankedHit {}

impl PartialOrd for RankedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// A collector that keeps the top N documents.
#[derive(Debug)]
pub struct TopDocsCollector {
    /// Maximum number of documents to collect.
    max_docs: usize,
    /// Ordering of hits.
    sort: SortField,
    /// Collected hits (max-heap with the worst hit on top).
    hits: BinaryHeap<RankedHit>,
    /// Total number of documents processed.
    total_hits: u64,
}

impl TopDocsCollector {
    /// Create a collector ranking by score.
    pub fn new(max_docs: usize) -> Self {
        Self::with_sort(max_docs, SortField::Score)
    }

    /// Create a collector with the given ordering.
    pub fn with_sort(max_docs: usize, sort: SortField) -> Self {
        TopDocsCollector {
            max_docs,
            sort,
            hits: BinaryHeap::new(),
            total_hits: 0,
        }
    }

    /// Get the maximum number of documents to collect.
    pub fn max_docs(&self) -> usize {
        self.max_docs
    }

    /// Get the total number of hits collected.
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// Collect a document hit.
    pub fn collect(&mut self, doc_id: u64, score: f32, sort_value: Option<f64>) {
        self.total_hits += 1;
        self.offer(RankedHit {
            key: self.sort.key(score, sort_value),
            hit: SearchHit {
                doc_id,
                score,
                sort_value,
            },
        });
    }

    fn offer(&mut self, candidate: RankedHit) {
        if self.hits.len() < self.max_docs {
            self.hits.push(candidate);
        } else if let Some(worst) = self.hits.peek() {
            if candidate < *worst {
                self.hits.pop();
                self.hits.push(candidate);
            }
        }
    }

    /// Add the hits of another collector, e.g. of another segment.
    pub fn merge(&mut self, other: TopDocsCollector) {
        self.total_hits += other.total_hits;
        for hit in other.hits {
            self.offer(hit);
        }
    }

    /// Get the final results, best first.
    pub fn into_top_docs(self) -> TopDocs {
        TopDocs {
            total_hits: self.total_hits,
            hits: self
                .hits
                .into_sorted_vec()
                .into_iter()
                .map(|ranked| ranked.hit)
                .collect(),
        }
    }
}

/// Sort hits by score descending, then doc id ascending.
pub fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}
