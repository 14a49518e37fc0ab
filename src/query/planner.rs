//! Planning of a complete search request.
//!
//! The planner turns an [`ExpandedQuery`] into a [`SearchPlan`]: the user
//! query, filters built against the same statistics registry, and boost
//! queries applied either as optional clauses of the main query or through
//! a second ranking pass.

use std::sync::Arc;

use tracing::debug;

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::config::{BoostMethod, BoostSimilarity, BuilderConfig, FieldBoostModel};
use crate::error::{PilumError, Result};
use crate::index::IndexAccess;
use crate::index::cache::CacheAccess;
use crate::query::builder::QueryTreeBuilder;
use crate::query::field_boost::SearchFieldsAndBoosting;
use crate::query::model::{BoostQuery, ExpandedQuery, RewrittenQuery};
use crate::query::node::{BooleanGroupNode, Occur, QueryNode};
use crate::query::raw::{FieldValueParser, RawQueryParser};
use crate::search::collector::{SortField, TopDocs};
use crate::search::rerank::{RerankSpec, TwoPassReRanker};
use crate::search::searcher::{SearchRequest, Searcher};
use crate::stats::{CorrectionMode, StatsCorrectionRegistry};

/// How the hits of a plan are ranked.
#[derive(Debug, Clone)]
pub enum Ranking {
    /// One query ranks all hits.
    Single(QueryNode),
    /// Boost queries rescore the top of the user query ranking.
    Rerank(RerankSpec),
}

/// Executable outcome of planning one request.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    /// Registry of the user query and filters.
    pub registry: Arc<StatsCorrectionRegistry>,
    /// Queries every hit must match.
    pub filters: Vec<QueryNode>,
    pub ranking: Ranking,
}

impl SearchPlan {
    /// The query retrieving the hits.
    pub fn main_query(&self) -> &QueryNode {
        match &self.ranking {
            Ranking::Single(node) => node,
            Ranking::Rerank(spec) => &spec.primary,
        }
    }

    /// Run the plan and return the hits `start..start + rows`.
    pub fn execute(
        &self,
        index: &dyn IndexAccess,
        start: usize,
        rows: usize,
        sort: SortField,
    ) -> Result<TopDocs> {
        let searcher = Searcher::new(index);
        match &self.ranking {
            Ranking::Single(node) => {
                let request = SearchRequest::new(node.clone())
                    .with_filters(self.filters.clone())
                    .with_limit(start.saturating_add(rows))
                    .with_sort(sort);
                let mut top = searcher.search(&request)?;
                top.hits.drain(..start.min(top.hits.len()));
                Ok(top)
            }
            Ranking::Rerank(spec) => {
                TwoPassReRanker::new(spec.clone()).run(&searcher, &self.filters, start, rows, sort)
            }
        }
    }
}

/// Plans requests with one configuration.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    config: BuilderConfig,
    analyzer: Arc<dyn Analyzer>,
    raw_parser: Arc<dyn RawQueryParser>,
    cache: Option<CacheAccess>,
}

impl QueryPlanner {
    /// Create a planner. The configuration is validated first.
    pub fn new(config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        Ok(QueryPlanner {
            config,
            analyzer: Arc::new(StandardAnalyzer::new()),
            raw_parser: Arc::new(FieldValueParser::new()),
            cache: None,
        })
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_raw_parser(mut self, raw_parser: Arc<dyn RawQueryParser>) -> Self {
        self.raw_parser = raw_parser;
        self
    }

    pub fn with_cache(mut self, cache: CacheAccess) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn builder(
        &self,
        registry: Arc<StatsCorrectionRegistry>,
        fields: SearchFieldsAndBoosting,
    ) -> QueryTreeBuilder {
        QueryTreeBuilder::new(registry, fields)
            .with_analyzer(Arc::clone(&self.analyzer))
            .with_tie_breaker(self.config.tie_breaker)
            .with_normalize_boolean(self.config.normalize_boolean)
    }

    /// Plan `expanded`. Statistics are not read until the plan executes.
    pub fn plan(&self, expanded: &ExpandedQuery) -> Result<SearchPlan> {
        let fields =
            SearchFieldsAndBoosting::from_config(&self.config).with_cache(self.cache.clone());
        let registry = StatsCorrectionRegistry::shared(CorrectionMode::Corrected);
        let mut builder = self.builder(Arc::clone(&registry), fields.clone());

        let user_query = match &expanded.user_query {
            RewrittenQuery::Raw(raw) if raw.trim().is_empty() => {
                return Err(PilumError::structural("user query is empty"));
            }
            query if query.is_match_all() => QueryNode::MatchAll,
            RewrittenQuery::Raw(raw) => self.raw_parser.parse(raw)?,
            RewrittenQuery::Query(query) => builder.create_query(query)?,
        };
        registry.finished_user_query()?;

        let mut filters = Vec::with_capacity(expanded.filter_queries.len());
        for filter in &expanded.filter_queries {
            filters.push(match filter {
                RewrittenQuery::Raw(raw) => self.raw_parser.parse(raw)?,
                RewrittenQuery::Query(query) => {
                    builder.reset();
                    builder.create_query(query)?
                }
            });
        }

        let boosts = self.boost_queries(expanded, &registry, &fields)?;
        debug!(
            user_query = %user_query,
            filters = filters.len(),
            boosts = boosts.len(),
            method = ?self.config.boost_method,
            "planned request"
        );

        let ranking = if boosts.is_empty() {
            Ranking::Single(user_query)
        } else {
            let boosts: Vec<(QueryNode, Occur)> =
                boosts.into_iter().map(|boost| (boost, Occur::Should)).collect();
            match self.config.boost_method {
                BoostMethod::Opt => {
                    let mut children = Vec::with_capacity(boosts.len() + 1);
                    children.push((user_query, Occur::Must));
                    children.extend(boosts);
                    Ranking::Single(QueryNode::Boolean(BooleanGroupNode::new(children, false)))
                }
                BoostMethod::Rerank => Ranking::Rerank(RerankSpec::new(
                    user_query,
                    QueryNode::Boolean(BooleanGroupNode::new(boosts, false)),
                    self.config.rerank_num_docs,
                    self.config.rerank_weight,
                )),
            }
        };

        Ok(SearchPlan {
            registry,
            filters,
            ranking,
        })
    }

    fn boost_queries(
        &self,
        expanded: &ExpandedQuery,
        user_registry: &Arc<StatsCorrectionRegistry>,
        fields: &SearchFieldsAndBoosting,
    ) -> Result<Vec<QueryNode>> {
        if expanded.boost_up_queries.is_empty() && expanded.boost_down_queries.is_empty() {
            return Ok(Vec::new());
        }

        let fields = if self.config.boost_field_boost {
            fields.clone()
        } else {
            fields.with_field_boost_model(FieldBoostModel::Off)
        };
        let new_builder = |registry: &Arc<StatsCorrectionRegistry>| {
            match self.config.boost_similarity {
                BoostSimilarity::Off => QueryTreeBuilder::boost_only(fields.clone())
                    .with_analyzer(Arc::clone(&self.analyzer))
                    .with_tie_breaker(self.config.tie_breaker)
                    .with_normalize_boolean(self.config.normalize_boolean),
                BoostSimilarity::On | BoostSimilarity::Dfc => {
                    self.builder(Arc::clone(registry), fields.clone())
                }
            }
        };
        let registry = match self.config.boost_similarity {
            BoostSimilarity::Dfc => Arc::clone(user_registry),
            BoostSimilarity::On | BoostSimilarity::Off => {
                StatsCorrectionRegistry::shared(CorrectionMode::Standard)
            }
        };

        let mut up = new_builder(&registry);
        // penalties add up across alternatives
        let mut down = new_builder(&registry).with_tie_breaker(1.0);

        let mut nodes = Vec::with_capacity(
            expanded.boost_up_queries.len() + expanded.boost_down_queries.len(),
        );
        for boost in &expanded.boost_up_queries {
            nodes.push(self.boost_query(boost, 1.0, &mut up)?);
        }
        for boost in &expanded.boost_down_queries {
            nodes.push(self.boost_query(boost, -1.0, &mut down)?);
        }
        Ok(nodes)
    }

    fn boost_query(
        &self,
        boost: &BoostQuery,
        factor: f32,
        builder: &mut QueryTreeBuilder,
    ) -> Result<QueryNode> {
        let node = match &boost.query {
            RewrittenQuery::Raw(raw) => self.raw_parser.parse(raw)?,
            RewrittenQuery::Query(query) => {
                builder.reset();
                builder.create_query(query)?
            }
        };
        Ok(node.boosted(factor * boost.boost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Term;
    use crate::index::memory::{MemoryDocument, MemoryIndex};
    use crate::query::model::{BooleanQuery, DisjunctionMaxQuery, QueryTerm};

    fn planner(config: BuilderConfig) -> QueryPlanner {
        QueryPlanner::new(config).unwrap()
    }

    fn laptop_query() -> BooleanQuery {
        BooleanQuery::default().with_clause(
            DisjunctionMaxQuery::of_terms(Occur::Should, ["laptop"])
                .with_clause(QueryTerm::generated("notebook")),
        )
    }

    fn index() -> MemoryIndex {
        MemoryIndex::from_documents(vec![
            MemoryDocument::new().with_text("title", "laptop sleeve"),
            MemoryDocument::new()
                .with_text("title", "notebook computer")
                .with_text("brand", "acme"),
            MemoryDocument::new().with_text("title", "laptop computer").with_text("brand", "acme"),
            MemoryDocument::new().with_text("title", "paper notebook"),
        ])
        .unwrap()
    }

    #[test]
    fn test_plain_user_query() {
        let plan = planner(BuilderConfig::new(["title"]))
            .plan(&ExpandedQuery::new(laptop_query()))
            .unwrap();

        assert!(matches!(plan.ranking, Ranking::Single(_)));
        assert_eq!(plan.registry.end_user_query(), Some(2));
        assert_eq!(plan.main_query().leaf_count(), 2);
    }

    #[test]
    fn test_empty_user_query() {
        let planner = planner(BuilderConfig::new(["title"]));

        let err = planner.plan(&ExpandedQuery::new(RewrittenQuery::Raw("  ".into()))).unwrap_err();
        assert!(matches!(err, PilumError::Structural(_)));
        let err = planner.plan(&ExpandedQuery::new(BooleanQuery::default())).unwrap_err();
        assert!(matches!(err, PilumError::Structural(_)));
    }

    #[test]
    fn test_match_all_user_query() {
        let plan = planner(BuilderConfig::new(["title"]))
            .plan(
                &ExpandedQuery::new(RewrittenQuery::Raw("*:*".into())).with_filter(laptop_query()),
            )
            .unwrap();

        assert!(matches!(plan.main_query(), QueryNode::MatchAll));
        assert_eq!(plan.registry.end_user_query(), Some(0));
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.registry.term_count(), 2);
    }

    #[test]
    fn test_filters_share_registry() {
        let filter = BooleanQuery::default()
            .with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, ["computer"]));
        let plan = planner(BuilderConfig::new(["title"]))
            .plan(
                &ExpandedQuery::new(laptop_query())
                    .with_filter(filter)
                    .with_filter(RewrittenQuery::Raw("brand:acme".into())),
            )
            .unwrap();

        assert_eq!(plan.filters.len(), 2);
        assert_eq!(plan.registry.clause_offsets(), vec![0, 2]);
        assert_eq!(plan.registry.terms()[2], Term::new("title", "computer"));
    }

    #[test]
    fn test_opt_boosts_become_optional_clauses() {
        let boost = BooleanQuery::default()
            .with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, ["computer"]));
        let plan = planner(BuilderConfig::new(["title"]))
            .plan(
                &ExpandedQuery::new(laptop_query())
                    .with_boost_up(boost.clone(), 2.0)
                    .with_boost_down(RewrittenQuery::Raw("title:sleeve".into()), 1.0),
            )
            .unwrap();

        let QueryNode::Boolean(main) = plan.main_query() else {
            panic!("expected boolean main query");
        };
        assert!(!main.normalize_score());
        let occurs: Vec<Occur> = main.children().iter().map(|(_, occur)| *occur).collect();
        assert_eq!(occurs, vec![Occur::Must, Occur::Should, Occur::Should]);

        let QueryNode::Boosted(up) = &main.children()[1].0 else {
            panic!("expected boosted up query");
        };
        assert_eq!(up.boost(), 2.0);
        let QueryNode::Boosted(down) = &main.children()[2].0 else {
            panic!("expected boosted down query");
        };
        assert_eq!(down.boost(), -1.0);

        // dfc boosts register with the user registry after the user query
        assert_eq!(plan.registry.clause_offsets(), vec![0, 2]);
    }

    #[test]
    fn test_rerank_plan() {
        let boost = BooleanQuery::default()
            .with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, ["computer"]));
        let config = BuilderConfig::new(["title"])
            .with_boost_method(BoostMethod::Rerank)
            .with_rerank(10, 3.0);
        let plan = planner(config)
            .plan(&ExpandedQuery::new(laptop_query()).with_boost_up(boost, 1.0))
            .unwrap();

        let Ranking::Rerank(spec) = &plan.ranking else {
            panic!("expected rerank");
        };
        assert_eq!(spec.window, 10);
        assert_eq!(spec.weight, 3.0);
        assert_eq!(spec.primary.leaf_count(), 2);
    }

    #[test]
    fn test_boost_similarity_modes() {
        let boost = BooleanQuery::default()
            .with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, ["computer"]));
        let expanded = ExpandedQuery::new(laptop_query()).with_boost_up(boost, 1.0);

        let config = BuilderConfig::new(["title"]).with_boost_similarity(BoostSimilarity::On);
        let plan = planner(config).plan(&expanded).unwrap();
        let QueryNode::Boolean(main) = plan.main_query() else {
            panic!("expected boolean main query");
        };
        let QueryNode::Boolean(boost_root) = &main.children()[1].0 else {
            panic!("expected boost tree");
        };
        let QueryNode::Disjunction(dmq) = &boost_root.children()[0].0 else {
            panic!("expected alternative group");
        };
        let QueryNode::Term(leaf) = &dmq.children()[0] else {
            panic!("expected similarity leaf");
        };
        assert_ne!(leaf.registry().id(), plan.registry.id());
        assert_eq!(leaf.registry().mode(), CorrectionMode::Standard);
        assert_eq!(plan.registry.term_count(), 2);

        let config = BuilderConfig::new(["title"]).with_boost_similarity(BoostSimilarity::Off);
        let plan = planner(config).plan(&expanded).unwrap();
        let QueryNode::Boolean(main) = plan.main_query() else {
            panic!("expected boolean main query");
        };
        assert!(main.children()[1].0.to_string().contains("ConstantScore(title:computer)"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            QueryPlanner::new(BuilderConfig::default()),
            Err(PilumError::Configuration(_))
        ));
    }

    #[test]
    fn test_execute_with_boost() {
        let index = index();
        let boost = BooleanQuery::default()
            .with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, ["computer"]));
        let config = BuilderConfig::new(["title"]).with_boost_similarity(BoostSimilarity::Off);
        let plan = planner(config)
            .plan(&ExpandedQuery::new(laptop_query()).with_boost_up(boost, 100.0))
            .unwrap();

        let top = plan.execute(&index, 0, 10, SortField::Score).unwrap();
        assert_eq!(top.total_hits, 4);
        let first_two: Vec<u64> = top.hits[..2].iter().map(|h| h.doc_id).collect();
        assert!(first_two.contains(&1) && first_two.contains(&2));

        let page = plan.execute(&index, 1, 2, SortField::Score).unwrap();
        assert_eq!(page.hits.len(), 2);
        assert_eq!(page.hits[0].doc_id, top.hits[1].doc_id);
    }
}
