//! Weights: scoring trees bound to the statistics of one index snapshot.
//!
//! A [`Weight`] is created once per search from a [`QueryNode`] and then asked
//! for a scorer per segment. Creating the weight of a [`TermNode`] triggers
//! the registry's one-time statistics computation.

use tracing::trace;

use crate::error::Result;
use crate::index::{FieldStats, IndexAccess, Term, TermHandle, open_postings};
use crate::query::node::{BooleanGroupNode, Occur, QueryNode, TermNode};
use crate::search::scorer::{
    BoxedScorer, Combine, ConjunctionScorer, ConstantScorer, DisjunctionScorer, MatchAllScorer,
    ReqExclScorer, ReqOptScorer, TermScorer,
};
use crate::search::similarity::{Bm25Similarity, SimScorer};

/// Settings shared by all weights of one search.
#[derive(Debug, Clone, Copy)]
pub struct WeightContext<'a> {
    pub index: &'a dyn IndexAccess,
    pub similarity: Bm25Similarity,
    pub needs_scores: bool,
}

impl<'a> WeightContext<'a> {
    pub fn new(index: &'a dyn IndexAccess, similarity: Bm25Similarity, needs_scores: bool) -> Self {
        WeightContext {
            index,
            similarity,
            needs_scores,
        }
    }

    fn without_scores(self) -> Self {
        WeightContext {
            needs_scores: false,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct TermWeight {
    term: Term,
    handle: TermHandle,
    sim: SimScorer,
}

#[derive(Debug, Clone)]
pub struct ConstantWeight {
    term: Term,
    handle: TermHandle,
    score: f32,
}

#[derive(Debug, Clone)]
pub struct BooleanWeight {
    must: Vec<Weight>,
    should: Vec<Weight>,
    must_not: Vec<Weight>,
}

#[derive(Debug, Clone)]
pub struct DisMaxWeight {
    children: Vec<Weight>,
    tie_breaker: f32,
}

/// A query node prepared for execution.
#[derive(Debug, Clone)]
pub enum Weight {
    Term(TermWeight),
    Constant(ConstantWeight),
    Boolean(BooleanWeight),
    DisMax(DisMaxWeight),
    MatchAll { score: f32 },
    /// Matches nothing and never touches postings.
    NoMatch,
}

impl Weight {
    /// Create the weight of `node` with query boost `boost`.
    pub fn create(node: &QueryNode, ctx: WeightContext<'_>, boost: f32) -> Result<Weight> {
        match node {
            QueryNode::Term(term) => term_weight(term, ctx, boost),
            QueryNode::BoostOnlyTerm(leaf) => {
                let (doc_freq, handle) = ctx.index.document_frequency(leaf.term())?;
                if doc_freq == 0 {
                    return Ok(Weight::NoMatch);
                }
                let score = if ctx.needs_scores {
                    leaf.field_boost().boost(leaf.term().field(), ctx.index)? * boost
                } else {
                    0.0
                };
                Ok(Weight::Constant(ConstantWeight {
                    term: leaf.term().clone(),
                    handle,
                    score,
                }))
            }
            QueryNode::Boolean(group) => boolean_weight(group, ctx, boost),
            QueryNode::Disjunction(group) => {
                let children = group
                    .children()
                    .iter()
                    .map(|child| Weight::create(child, ctx, boost))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Weight::DisMax(DisMaxWeight {
                    children,
                    tie_breaker: group.tie_breaker(),
                }))
            }
            QueryNode::Boosted(boosted) => {
                Weight::create(boosted.node(), ctx, boost * boosted.boost())
            }
            QueryNode::MatchAll => Ok(Weight::MatchAll { score: boost }),
        }
    }

    /// Create the scorer of one segment, `None` if nothing can match there.
    pub fn scorer<'a>(
        &self,
        index: &'a dyn IndexAccess,
        segment: usize,
    ) -> Result<Option<BoxedScorer<'a>>> {
        match self {
            Weight::Term(weight) => {
                Ok(open_postings(index, segment, &weight.term, &weight.handle)?.map(|postings| {
                    Box::new(TermScorer::new(
                        postings,
                        weight.sim,
                        index,
                        segment,
                        weight.term.field(),
                    )) as BoxedScorer<'a>
                }))
            }
            Weight::Constant(weight) => {
                Ok(
                    open_postings(index, segment, &weight.term, &weight.handle)?.map(|postings| {
                        Box::new(ConstantScorer::new(postings, weight.score)) as BoxedScorer<'a>
                    }),
                )
            }
            Weight::Boolean(weight) => weight.scorer(index, segment),
            Weight::DisMax(weight) => {
                let scorers = sub_scorers(&weight.children, index, segment)?;
                Ok(disjunction(
                    scorers,
                    Combine::Max {
                        tie_breaker: weight.tie_breaker,
                    },
                ))
            }
            Weight::MatchAll { score } => {
                let max_doc = index.segment_max_doc(segment);
                if max_doc == 0 {
                    return Ok(None);
                }
                Ok(Some(Box::new(MatchAllScorer::new(max_doc, *score))))
            }
            Weight::NoMatch => Ok(None),
        }
    }
}

impl BooleanWeight {
    fn scorer<'a>(
        &self,
        index: &'a dyn IndexAccess,
        segment: usize,
    ) -> Result<Option<BoxedScorer<'a>>> {
        let mut required = Vec::with_capacity(self.must.len());
        for weight in &self.must {
            match weight.scorer(index, segment)? {
                Some(scorer) => required.push(scorer),
                None => return Ok(None),
            }
        }
        let optional = sub_scorers(&self.should, index, segment)?;

        let main: BoxedScorer<'a> = if required.is_empty() {
            match disjunction(optional, Combine::Sum) {
                Some(scorer) => scorer,
                None => return Ok(None),
            }
        } else {
            let required: BoxedScorer<'a> = if required.len() == 1 {
                required.remove(0)
            } else {
                Box::new(ConjunctionScorer::new(required)?)
            };
            match disjunction(optional, Combine::Sum) {
                Some(optional) => Box::new(ReqOptScorer::new(required, optional)),
                None => required,
            }
        };

        let prohibited = sub_scorers(&self.must_not, index, segment)?;
        Ok(Some(match disjunction(prohibited, Combine::Sum) {
            Some(excluded) => Box::new(ReqExclScorer::new(main, excluded)?),
            None => main,
        }))
    }
}

fn sub_scorers<'a>(
    weights: &[Weight],
    index: &'a dyn IndexAccess,
    segment: usize,
) -> Result<Vec<BoxedScorer<'a>>> {
    let mut scorers = Vec::with_capacity(weights.len());
    for weight in weights {
        if let Some(scorer) = weight.scorer(index, segment)? {
            scorers.push(scorer);
        }
    }
    Ok(scorers)
}

fn disjunction<'a>(mut scorers: Vec<BoxedScorer<'a>>, combine: Combine) -> Option<BoxedScorer<'a>> {
    match scorers.len() {
        0 => None,
        1 => scorers.pop(),
        _ => Some(Box::new(DisjunctionScorer::new(scorers, combine))),
    }
}

fn term_weight(node: &TermNode, ctx: WeightContext<'_>, boost: f32) -> Result<Weight> {
    let resolved = node.resolve(ctx.index)?;
    let stats = resolved.stats();
    if stats.is_never_match() {
        trace!(term = %node.term(), "never-match term");
        return Ok(Weight::NoMatch);
    }

    let sim = if ctx.needs_scores {
        let field = node.term().field();
        let field_boost = node.field_boost().boost(field, ctx.index)?;
        let field_stats = ctx
            .index
            .field_stats(field)?
            .unwrap_or_else(|| FieldStats::empty(ctx.index.max_doc()));
        ctx.similarity
            .scorer(field_boost * boost, &field_stats, stats.handle().doc_freq())
    } else {
        ctx.similarity.scorer(boost, &FieldStats::unit(), 1)
    };

    Ok(Weight::Term(TermWeight {
        term: node.term().clone(),
        handle: stats.handle().clone(),
        sim,
    }))
}

fn boolean_weight(group: &BooleanGroupNode, ctx: WeightContext<'_>, boost: f32) -> Result<Weight> {
    let children = group.children();
    if children.is_empty() {
        return Ok(Weight::NoMatch);
    }
    let boost = if group.normalize_score() {
        boost / children.len() as f32
    } else {
        boost
    };

    let mut weight = BooleanWeight {
        must: Vec::new(),
        should: Vec::new(),
        must_not: Vec::new(),
    };
    for (child, occur) in children {
        match occur {
            Occur::Must => weight.must.push(Weight::create(child, ctx, boost)?),
            Occur::Should => weight.should.push(Weight::create(child, ctx, boost)?),
            Occur::MustNot => weight
                .must_not
                .push(Weight::create(child, ctx.without_scores(), 1.0)?),
        }
    }
    Ok(Weight::Boolean(weight))
}
