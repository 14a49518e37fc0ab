//! Two-phase construction of scoring trees from rewritten queries.
//!
//! Phase one ([`QueryTreeBuilder::prepare`]) walks the input depth-first,
//! opens a registry clause for every alternative group that is not nested in
//! another alternative group and registers every expanded term. Phase two
//! ([`QueryTreeBuilder::build`]) turns the prepared tree into [`QueryNode`]s.
//! Statistics are not read during either phase; leaves resolve them on first
//! execution, after all sibling builds sharing the registry are registered.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::query::field_boost::{FieldBoost, SearchFieldsAndBoosting};
use crate::query::model::{BooleanQuery, Clause, DisjunctionClause, DisjunctionMaxQuery, QueryTerm};
use crate::query::node::{
    BooleanGroupNode, BoostOnlyTermNode, DisjunctionGroupNode, Occur, QueryNode, TermNode,
};
use crate::stats::{StatsCorrectionRegistry, TermIndex};

/// How term leaves are scored.
#[derive(Debug, Clone)]
pub enum LeafMode {
    /// Corpus similarity over statistics of the given registry.
    Similarity(Arc<StatsCorrectionRegistry>),
    /// Field boost only; terms are not registered.
    BoostOnly,
}

/// Recursion carried state of the prepare walk.
#[derive(Debug, Clone, Copy, Default)]
struct WalkContext {
    within_alternatives: bool,
    generated: bool,
    clause: Option<usize>,
}

/// Output of phase one.
#[derive(Debug)]
enum PreparedNode {
    Term {
        registry: Arc<StatsCorrectionRegistry>,
        term_index: TermIndex,
        term: Term,
        field_boost: Arc<dyn FieldBoost>,
    },
    BoostOnly {
        term: Term,
        field_boost: Arc<dyn FieldBoost>,
    },
    Boolean {
        children: Vec<(PreparedNode, Occur)>,
        normalize: bool,
    },
    Disjunction {
        children: Vec<PreparedNode>,
    },
}

/// Builds executable scoring trees bound to one registry.
#[derive(Debug)]
pub struct QueryTreeBuilder {
    leaves: LeafMode,
    fields: SearchFieldsAndBoosting,
    analyzer: Arc<dyn Analyzer>,
    tie_breaker: f32,
    normalize_boolean: bool,
    prepared: Option<PreparedNode>,
}

impl QueryTreeBuilder {
    /// Builder whose leaves are scored by similarity over `registry`.
    pub fn new(registry: Arc<StatsCorrectionRegistry>, fields: SearchFieldsAndBoosting) -> Self {
        Self::with_leaf_mode(LeafMode::Similarity(registry), fields)
    }

    /// Builder whose leaves are scored by field boost only.
    pub fn boost_only(fields: SearchFieldsAndBoosting) -> Self {
        Self::with_leaf_mode(LeafMode::BoostOnly, fields)
    }

    pub fn with_leaf_mode(leaves: LeafMode, fields: SearchFieldsAndBoosting) -> Self {
        QueryTreeBuilder {
            leaves,
            fields,
            analyzer: Arc::new(StandardAnalyzer::new()),
            tie_breaker: 0.0,
            normalize_boolean: true,
            prepared: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_tie_breaker(mut self, tie_breaker: f32) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    pub fn with_normalize_boolean(mut self, normalize_boolean: bool) -> Self {
        self.normalize_boolean = normalize_boolean;
        self
    }

    /// The registry leaves are registered with, if leaves use similarity.
    pub fn registry(&self) -> Option<&Arc<StatsCorrectionRegistry>> {
        match &self.leaves {
            LeafMode::Similarity(registry) => Some(registry),
            LeafMode::BoostOnly => None,
        }
    }

    pub fn fields(&self) -> &SearchFieldsAndBoosting {
        &self.fields
    }

    /// Check whether a prepared tree waits for [`QueryTreeBuilder::build`].
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Drop a prepared but unbuilt tree. Configuration and the registry
    /// (with everything registered so far) are kept.
    pub fn reset(&mut self) {
        self.prepared = None;
    }

    /// Phase one: register all terms of `query`.
    pub fn prepare(&mut self, query: &BooleanQuery) -> Result<()> {
        if self.prepared.is_some() {
            return Err(PilumError::invalid_operation(
                "a prepared query must be built or reset before preparing the next one",
            ));
        }
        let root = self
            .prepare_boolean(query, WalkContext::default())?
            .unwrap_or(PreparedNode::Boolean {
                children: Vec::new(),
                normalize: false,
            });
        self.prepared = Some(root);
        Ok(())
    }

    /// Phase two: build the prepared tree.
    pub fn build(&mut self) -> Result<QueryNode> {
        let prepared = self
            .prepared
            .take()
            .ok_or_else(|| PilumError::invalid_operation("no query was prepared"))?;
        Ok(self.to_node(prepared))
    }

    /// Run both phases.
    pub fn create_query(&mut self, query: &BooleanQuery) -> Result<QueryNode> {
        self.prepare(query)?;
        self.build()
    }

    fn prepare_boolean(
        &self,
        query: &BooleanQuery,
        ctx: WalkContext,
    ) -> Result<Option<PreparedNode>> {
        if query.clauses.is_empty() {
            return Err(PilumError::structural("boolean group without clauses"));
        }
        let ctx = WalkContext {
            generated: ctx.generated || query.generated,
            ..ctx
        };

        let mut children = Vec::with_capacity(query.clauses.len());
        for clause in &query.clauses {
            let (child, occur) = match clause {
                Clause::Boolean(nested) => (self.prepare_boolean(nested, ctx)?, nested.occur),
                Clause::Disjunction(dmq) => (self.prepare_disjunction(dmq, ctx)?, dmq.occur),
            };
            if let Some(child) = child {
                children.push((child, occur));
            }
        }

        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(PreparedNode::Boolean {
            children,
            normalize: self.normalize_boolean && ctx.within_alternatives,
        }))
    }

    fn prepare_disjunction(
        &self,
        dmq: &DisjunctionMaxQuery,
        ctx: WalkContext,
    ) -> Result<Option<PreparedNode>> {
        if dmq.occur == Occur::MustNot && dmq.clauses.len() != 1 {
            return Err(PilumError::configuration(format!(
                "a negated alternative group needs exactly one clause, got {}",
                dmq.clauses.len()
            )));
        }
        if dmq.clauses.is_empty() {
            return Err(PilumError::structural("alternative group without clauses"));
        }

        let ctx = if ctx.within_alternatives {
            ctx
        } else {
            let clause = match self.registry() {
                Some(registry) => Some(registry.new_clause()?),
                None => None,
            };
            WalkContext {
                within_alternatives: true,
                clause,
                ..ctx
            }
        };

        let mut children = Vec::with_capacity(dmq.clauses.len());
        for clause in &dmq.clauses {
            match clause {
                DisjunctionClause::Term(term) => children.extend(self.prepare_term(term, ctx)?),
                DisjunctionClause::Boolean(query) => {
                    children.extend(self.prepare_boolean(query, ctx)?);
                }
            }
        }

        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(PreparedNode::Disjunction { children }))
    }

    /// Expand a term over its fields. A single token yields one leaf per
    /// field; several tokens yield a MUST group of per-token alternatives.
    fn prepare_term(&self, term: &QueryTerm, ctx: WalkContext) -> Result<Vec<PreparedNode>> {
        let generated = ctx.generated || term.generated;
        let fields: Vec<&str> = match &term.field {
            Some(field) if self.fields.is_searchable(field, generated) => vec![field.as_str()],
            Some(field) => {
                debug!(
                    field = %field,
                    value = %term.value,
                    "dropping term on a field that is not searched"
                );
                Vec::new()
            }
            None => self.fields.fields(generated).keys().map(String::as_str).collect(),
        };
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.analyzer.analyze(&term.value)?;
        match tokens.as_slice() {
            [] => Ok(Vec::new()),
            [token] => self.prepare_token(token, &fields, generated, ctx),
            _ => {
                let mut children = Vec::with_capacity(tokens.len());
                for token in &tokens {
                    let leaves = self.prepare_token(token, &fields, generated, ctx)?;
                    children.push((PreparedNode::Disjunction { children: leaves }, Occur::Must));
                }
                Ok(vec![PreparedNode::Boolean {
                    children,
                    normalize: self.normalize_boolean,
                }])
            }
        }
    }

    fn prepare_token(
        &self,
        token: &str,
        fields: &[&str],
        generated: bool,
        ctx: WalkContext,
    ) -> Result<Vec<PreparedNode>> {
        let field_boost = self.fields.field_boost(token, generated);
        let mut leaves = Vec::with_capacity(fields.len());
        for field in fields {
            let term = Term::new(*field, token);
            let leaf = match &self.leaves {
                LeafMode::Similarity(registry) => {
                    let term_index = registry.register(term.clone())?;
                    trace!(
                        term = %term,
                        slot = term_index.slot(),
                        clause = ?ctx.clause,
                        "registered term"
                    );
                    PreparedNode::Term {
                        registry: Arc::clone(registry),
                        term_index,
                        term,
                        field_boost: Arc::clone(&field_boost),
                    }
                }
                LeafMode::BoostOnly => PreparedNode::BoostOnly {
                    term,
                    field_boost: Arc::clone(&field_boost),
                },
            };
            leaves.push(leaf);
        }
        Ok(leaves)
    }

    fn to_node(&self, prepared: PreparedNode) -> QueryNode {
        match prepared {
            PreparedNode::Term {
                registry,
                term_index,
                term,
                field_boost,
            } => QueryNode::Term(TermNode::new(registry, term_index, term, field_boost)),
            PreparedNode::BoostOnly { term, field_boost } => {
                QueryNode::BoostOnlyTerm(BoostOnlyTermNode::new(term, field_boost))
            }
            PreparedNode::Boolean { children, normalize } => {
                let children = children
                    .into_iter()
                    .map(|(child, occur)| (self.to_node(child), occur))
                    .collect();
                QueryNode::Boolean(BooleanGroupNode::new(children, normalize))
            }
            PreparedNode::Disjunction { children } => {
                let children = children.into_iter().map(|child| self.to_node(child)).collect();
                QueryNode::Disjunction(DisjunctionGroupNode::new(children, self.tie_breaker))
            }
        }
    }
}
