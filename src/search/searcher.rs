//! Searching an index with scoring trees.

use rayon::prelude::*;

use crate::error::Result;
use crate::index::{IndexAccess, NO_MORE_DOCS};
use crate::query::node::QueryNode;
use crate::search::collector::{SortField, TopDocs, TopDocsCollector};
use crate::search::scorer::BoxedScorer;
use crate::search::similarity::Bm25Similarity;
use crate::search::weight::{Weight, WeightContext};

/// A ranked retrieval request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The scoring query.
    pub query: QueryNode,
    /// Queries every hit must match. They do not contribute to the score.
    pub filters: Vec<QueryNode>,
    /// Maximum number of hits to return.
    pub limit: usize,
    /// Ordering of hits.
    pub sort: SortField,
}

impl SearchRequest {
    pub fn new(query: QueryNode) -> Self {
        SearchRequest {
            query,
            filters: Vec::new(),
            limit: 10,
            sort: SortField::Score,
        }
    }

    pub fn with_filters(mut self, filters: Vec<QueryNode>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.sort = sort;
        self
    }
}

/// Executes scoring trees over all segments of an index.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    index: &'a dyn IndexAccess,
    similarity: Bm25Similarity,
}

impl<'a> Searcher<'a> {
    pub fn new(index: &'a dyn IndexAccess) -> Self {
        Searcher {
            index,
            similarity: Bm25Similarity::new(),
        }
    }

    pub fn with_similarity(mut self, similarity: Bm25Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn index(&self) -> &'a dyn IndexAccess {
        self.index
    }

    /// Prepare `node` for execution.
    pub fn create_weight(&self, node: &QueryNode, needs_scores: bool) -> Result<Weight> {
        Weight::create(
            node,
            WeightContext::new(self.index, self.similarity, needs_scores),
            1.0,
        )
    }

    /// Run a request, searching segments in parallel.
    pub fn search(&self, request: &SearchRequest) -> Result<TopDocs> {
        let weight = self.create_weight(&request.query, true)?;
        let filters = request
            .filters
            .iter()
            .map(|filter| self.create_weight(filter, false))
            .collect::<Result<Vec<_>>>()?;

        let collectors = (0..self.index.segment_count())
            .into_par_iter()
            .map(|segment| self.search_segment(segment, &weight, &filters, request))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = TopDocsCollector::with_sort(request.limit, request.sort.clone());
        for collector in collectors {
            merged.merge(collector);
        }
        Ok(merged.into_top_docs())
    }

    fn search_segment(
        &self,
        segment: usize,
        weight: &Weight,
        filters: &[Weight],
        request: &SearchRequest,
    ) -> Result<TopDocsCollector> {
        let mut collector = TopDocsCollector::with_sort(request.limit, request.sort.clone());
        let Some(mut scorer) = weight.scorer(self.index, segment)? else {
            return Ok(collector);
        };
        let mut filter_scorers = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter.scorer(self.index, segment)? {
                Some(scorer) => filter_scorers.push(scorer),
                None => return Ok(collector),
            }
        }

        let doc_base = self.index.segment_doc_base(segment);
        let sort_field = request.sort.field_name();
        let mut doc = scorer.doc_id();
        while doc != NO_MORE_DOCS {
            if passes_filters(&mut filter_scorers, doc)? {
                let score = scorer.score()?;
                let sort_value = match sort_field {
                    Some(field) => self.index.sort_value(segment, field, doc)?,
                    None => None,
                };
                collector.collect(doc_base + doc, score, sort_value);
            }
            scorer.next()?;
            doc = scorer.doc_id();
        }
        Ok(collector)
    }

    /// Score the given global doc ids with `node`. Documents the node does
    /// not match get `None`.
    pub fn score_docs(&self, node: &QueryNode, docs: &[u64]) -> Result<Vec<Option<f32>>> {
        let weight = self.create_weight(node, true)?;

        let per_segment = (0..self.index.segment_count())
            .into_par_iter()
            .map(|segment| {
                let base = self.index.segment_doc_base(segment);
                let end = base + self.index.segment_max_doc(segment);
                let mut wanted: Vec<(usize, u64)> = docs
                    .iter()
                    .enumerate()
                    .filter(|&(_, &doc)| doc >= base && doc < end)
                    .map(|(position, &doc)| (position, doc - base))
                    .collect();
                if wanted.is_empty() {
                    return Ok(Vec::new());
                }
                wanted.sort_by_key(|&(_, doc)| doc);

                let mut scores = Vec::with_capacity(wanted.len());
                if let Some(mut scorer) = weight.scorer(self.index, segment)? {
                    for (position, doc) in wanted {
                        scorer.skip_to(doc)?;
                        if scorer.doc_id() == doc {
                            scores.push((position, scorer.score()?));
                        }
                    }
                }
                Ok(scores)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = vec![None; docs.len()];
        for (position, score) in per_segment.into_iter().flatten() {
            result[position] = Some(score);
        }
        Ok(result)
    }
}

fn passes_filters(filters: &mut [BoxedScorer<'_>], doc: u64) -> Result<bool> {
    for filter in filters.iter_mut() {
        filter.skip_to(doc)?;
        if filter.doc_id() != doc {
            return Ok(false);
        }
    }
    Ok(true)
}
