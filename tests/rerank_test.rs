//! Integration tests for applying boost queries by two-pass re-ranking

use std::sync::Arc;

use pilum::prelude::*;
use pilum::query::field_boost::NoFieldBoost;
use pilum::query::node::TermNode;
use pilum::search::RerankSpec;

fn index() -> Result<MemoryIndex> {
    MemoryIndex::from_documents(vec![
        MemoryDocument::new().with_text("title", "laptop"),
        MemoryDocument::new().with_text("title", "laptop sleeve"),
        MemoryDocument::new().with_text("title", "laptop acme"),
        MemoryDocument::new().with_text("title", "laptop acme pro case"),
        MemoryDocument::new().with_text("title", "laptop stand for desk work"),
        MemoryDocument::new().with_text("title", "acme mouse"),
    ])
}

fn expanded() -> ExpandedQuery {
    ExpandedQuery::new(BooleanQuery::from_text("laptop"))
        .with_boost_up(BooleanQuery::from_text("acme"), 10.0)
}

fn config(method: BoostMethod, window: usize, weight: f32) -> BuilderConfig {
    BuilderConfig::new(["title"])
        .with_boost_method(method)
        .with_rerank(window, weight)
        .with_boost_similarity(BoostSimilarity::Off)
}

fn doc_ids(top: &TopDocs) -> Vec<u64> {
    top.hits.iter().map(|hit| hit.doc_id).collect()
}

#[test]
fn test_window_limits_rescoring() -> Result<()> {
    let index = index()?;

    let primary = QueryPlanner::new(BuilderConfig::new(["title"]))?
        .plan(&ExpandedQuery::new(BooleanQuery::from_text("laptop")))?
        .execute(&index, 0, 10, SortField::Score)?;
    assert_eq!(doc_ids(&primary), vec![0, 1, 2, 3, 4]);

    let plan = QueryPlanner::new(config(BoostMethod::Rerank, 2, 1.0))?.plan(&expanded())?;
    let top = plan.execute(&index, 0, 10, SortField::Score)?;
    assert_eq!(doc_ids(&top), vec![0, 1, 2, 3, 4]);
    assert_eq!(top.total_hits, 5);

    let plan = QueryPlanner::new(config(BoostMethod::Rerank, 3, 1.0))?.plan(&expanded())?;
    let top = plan.execute(&index, 0, 10, SortField::Score)?;
    assert_eq!(doc_ids(&top), vec![2, 0, 1, 3, 4]);
    assert_eq!(top.hits[0].score, primary.hits[2].score + 10.0);

    Ok(())
}

#[test]
fn test_full_window_matches_optional_clauses() -> Result<()> {
    let index = index()?;

    let opt = QueryPlanner::new(config(BoostMethod::Opt, 500, 1.0))?
        .plan(&expanded())?
        .execute(&index, 0, 10, SortField::Score)?;
    let rerank = QueryPlanner::new(config(BoostMethod::Rerank, 500, 1.0))?
        .plan(&expanded())?
        .execute(&index, 0, 10, SortField::Score)?;

    assert_eq!(doc_ids(&opt), vec![2, 3, 0, 1, 4]);
    assert_eq!(doc_ids(&rerank), doc_ids(&opt));

    Ok(())
}

#[test]
fn test_zero_weight_keeps_primary_order() -> Result<()> {
    let index = index()?;

    let top = QueryPlanner::new(config(BoostMethod::Rerank, 500, 0.0))?
        .plan(&expanded())?
        .execute(&index, 0, 10, SortField::Score)?;

    assert_eq!(doc_ids(&top), vec![0, 1, 2, 3, 4]);

    Ok(())
}

#[test]
fn test_pagination_slices_merged_prefix() -> Result<()> {
    let index = index()?;
    let plan = QueryPlanner::new(config(BoostMethod::Rerank, 3, 1.0))?.plan(&expanded())?;

    let page = plan.execute(&index, 1, 2, SortField::Score)?;
    assert_eq!(doc_ids(&page), vec![0, 1]);

    let past_end = plan.execute(&index, 10, 2, SortField::Score)?;
    assert!(past_end.hits.is_empty());
    assert_eq!(past_end.total_hits, 5);

    Ok(())
}

#[test]
fn test_no_hits() -> Result<()> {
    let index = index()?;
    let expanded = ExpandedQuery::new(BooleanQuery::from_text("tablet"))
        .with_boost_up(BooleanQuery::from_text("acme"), 10.0);

    let top = QueryPlanner::new(config(BoostMethod::Rerank, 3, 1.0))?
        .plan(&expanded)?
        .execute(&index, 0, 10, SortField::Score)?;

    assert_eq!(top.total_hits, 0);
    assert!(top.hits.is_empty());

    Ok(())
}

#[test]
fn test_secondary_failure_is_reported() -> Result<()> {
    let stale = index()?;
    let current = index()?;

    let registry = StatsCorrectionRegistry::shared(CorrectionMode::Corrected);
    let term = Term::new("title", "acme");
    let slot = registry.register(term.clone())?;
    registry.compute_stats(&stale)?;
    let secondary = QueryNode::Term(TermNode::new(registry, slot, term, Arc::new(NoFieldBoost)));

    let reranker = TwoPassReRanker::new(RerankSpec::new(QueryNode::MatchAll, secondary, 3, 1.0));
    let err = reranker
        .run(&Searcher::new(&current), &[], 0, 5, SortField::Score)
        .unwrap_err();

    match err {
        PilumError::Rerank(cause) => assert!(matches!(*cause, PilumError::InvalidOperation(_))),
        other => panic!("expected rerank error, got {other:?}"),
    }

    Ok(())
}
