//! Two-pass re-ranking.
//!
//! The first pass retrieves the top `max(window, page length)` documents of
//! the primary query. The first `min(window, collected)` of them are
//! rescored with the secondary query and re-sorted by the combined score;
//! the rest of the first pass keeps its primary order below them.

use std::fmt::{self, Display};

use tracing::debug;

use crate::error::{PilumError, Result};
use crate::query::node::QueryNode;
use crate::search::collector::{SearchHit, SortField, TopDocs, sort_by_score};
use crate::search::searcher::{SearchRequest, Searcher};

/// Primary and secondary trees of a rerank together with window and weight.
#[derive(Debug, Clone)]
pub struct RerankSpec {
    pub primary: QueryNode,
    pub secondary: QueryNode,
    /// Number of top first-pass documents eligible for rescoring.
    pub window: usize,
    /// Weight of the secondary score.
    pub weight: f32,
}

impl RerankSpec {
    pub fn new(primary: QueryNode, secondary: QueryNode, window: usize, weight: f32) -> Self {
        RerankSpec {
            primary,
            secondary,
            window,
            weight,
        }
    }
}

/// Final score of a rescored document. Documents the secondary query does
/// not match keep their primary score.
pub fn combine(primary: f32, secondary: Option<f32>, weight: f32) -> f32 {
    match secondary {
        Some(secondary) => primary + weight * secondary,
        None => primary,
    }
}

/// Progress of a [`TwoPassReRanker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankState {
    AwaitingFirstPass,
    FirstPassComplete,
    /// Terminal.
    Rescored,
}

impl Display for RerankState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RerankState::AwaitingFirstPass => "awaiting first pass",
            RerankState::FirstPassComplete => "first pass complete",
            RerankState::Rescored => "rescored",
        };
        f.write_str(name)
    }
}

/// Runs a [`RerankSpec`] for one page.
#[derive(Debug)]
pub struct TwoPassReRanker {
    spec: RerankSpec,
    state: RerankState,
    first_pass: Vec<SearchHit>,
    total_hits: u64,
}

impl TwoPassReRanker {
    pub fn new(spec: RerankSpec) -> Self {
        TwoPassReRanker {
            spec,
            state: RerankState::AwaitingFirstPass,
            first_pass: Vec::new(),
            total_hits: 0,
        }
    }

    pub fn spec(&self) -> &RerankSpec {
        &self.spec
    }

    pub fn state(&self) -> RerankState {
        self.state
    }

    /// Hits of the first pass, in primary order.
    pub fn first_pass_hits(&self) -> &[SearchHit] {
        &self.first_pass
    }

    fn expect_state(&self, expected: RerankState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(PilumError::invalid_operation(format!(
                "cannot {operation} in state '{}'",
                self.state
            )));
        }
        Ok(())
    }

    /// Execute the primary query, collecting `max(window, page_length)` hits.
    pub fn first_pass(
        &mut self,
        searcher: &Searcher<'_>,
        filters: &[QueryNode],
        page_length: usize,
        sort: SortField,
    ) -> Result<()> {
        self.expect_state(RerankState::AwaitingFirstPass, "run the first pass")?;

        let request = SearchRequest::new(self.spec.primary.clone())
            .with_filters(filters.to_vec())
            .with_limit(self.spec.window.max(page_length))
            .with_sort(sort);
        let top = searcher.search(&request)?;

        self.total_hits = top.total_hits;
        self.first_pass = top.hits;
        self.state = RerankState::FirstPassComplete;
        debug!(
            collected = self.first_pass.len(),
            total_hits = self.total_hits,
            window = self.spec.window,
            "rerank first pass complete"
        );
        Ok(())
    }

    /// Rescore the window and return the page `start..start + how_many`.
    ///
    /// Any failure while scoring the secondary query is returned as
    /// [`PilumError::Rerank`]; primary-only results are never substituted.
    pub fn rescore(
        &mut self,
        searcher: &Searcher<'_>,
        start: usize,
        how_many: usize,
    ) -> Result<TopDocs> {
        self.expect_state(RerankState::FirstPassComplete, "rescore")?;

        let window = self.spec.window.min(self.first_pass.len());
        let docs: Vec<u64> = self.first_pass[..window].iter().map(|hit| hit.doc_id).collect();
        let secondary = searcher
            .score_docs(&self.spec.secondary, &docs)
            .map_err(PilumError::rerank)?;

        let mut rescored: Vec<SearchHit> = self.first_pass[..window]
            .iter()
            .zip(secondary)
            .map(|(hit, secondary)| SearchHit {
                score: combine(hit.score, secondary, self.spec.weight),
                ..hit.clone()
            })
            .collect();
        sort_by_score(&mut rescored);

        let wanted = start.saturating_add(how_many).min(self.first_pass.len());
        let page = if wanted == rescored.len() {
            rescored
        } else if wanted > rescored.len() {
            let mut page = rescored;
            page.extend_from_slice(&self.first_pass[page.len()..wanted]);
            page
        } else {
            rescored.truncate(wanted);
            rescored
        };

        self.state = RerankState::Rescored;
        debug!(window, page_length = page.len(), start, "rerank rescored");

        Ok(TopDocs {
            total_hits: self.total_hits,
            hits: page.into_iter().skip(start).collect(),
        })
    }

    /// Run both passes for the page `start..start + rows`.
    pub fn run(
        mut self,
        searcher: &Searcher<'_>,
        filters: &[QueryNode],
        start: usize,
        rows: usize,
        sort: SortField,
    ) -> Result<TopDocs> {
        self.first_pass(searcher, filters, start.saturating_add(rows), sort)?;
        self.rescore(searcher, start, rows)
    }
}
