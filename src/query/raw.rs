//! Pass-through parsing of raw sub-queries.

use std::fmt::Debug;
use std::sync::Arc;

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::error::{PilumError, Result};
use crate::index::Term;
use crate::query::field_boost::ConstantFieldBoost;
use crate::query::model::MATCH_ALL_QUERIES;
use crate::query::node::{BooleanGroupNode, BoostOnlyTermNode, Occur, QueryNode};

/// Parser for raw query strings injected by rewrite rules.
pub trait RawQueryParser: Send + Sync + Debug {
    /// Parse a raw query into a scoring tree.
    fn parse(&self, raw: &str) -> Result<QueryNode>;
}

/// Parses whitespace separated `field:value[^boost]` clauses.
///
/// Every clause becomes a SHOULD clause scored by its boost only. A value
/// that analyzes into several tokens requires all of them. `*:*` matches all
/// documents.
#[derive(Debug, Clone)]
pub struct FieldValueParser {
    analyzer: Arc<dyn Analyzer>,
}

impl Default for FieldValueParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldValueParser {
    pub fn new() -> Self {
        FieldValueParser {
            analyzer: Arc::new(StandardAnalyzer::new()),
        }
    }

    pub fn with_analyzer(analyzer: Arc<dyn Analyzer>) -> Self {
        FieldValueParser { analyzer }
    }

    fn parse_clause(&self, clause: &str) -> Result<Option<QueryNode>> {
        if MATCH_ALL_QUERIES.contains(&clause) {
            return Ok(Some(QueryNode::MatchAll));
        }
        let (field, rest) = clause.split_once(':').ok_or_else(|| {
            PilumError::structural(format!("raw clause '{clause}' is not of the form field:value"))
        })?;
        let (value, boost) = match rest.rsplit_once('^') {
            Some((value, boost)) => {
                let boost: f32 = boost.parse().map_err(|_| {
                    PilumError::structural(format!("invalid boost in raw clause '{clause}'"))
                })?;
                (value, boost)
            }
            None => (rest, 1.0),
        };
        if field.is_empty() || value.is_empty() {
            return Err(PilumError::structural(format!(
                "raw clause '{clause}' has an empty field or value"
            )));
        }

        let field_boost = Arc::new(ConstantFieldBoost(boost));
        let mut leaves: Vec<(QueryNode, Occur)> = self
            .analyzer
            .analyze(value)?
            .into_iter()
            .map(|token| {
                let leaf = BoostOnlyTermNode::new(Term::new(field, token), field_boost.clone());
                (QueryNode::BoostOnlyTerm(leaf), Occur::Must)
            })
            .collect();

        Ok(match leaves.len() {
            0 => None,
            1 => leaves.pop().map(|(leaf, _)| leaf),
            _ => Some(QueryNode::Boolean(BooleanGroupNode::new(leaves, false))),
        })
    }
}

impl RawQueryParser for FieldValueParser {
    fn parse(&self, raw: &str) -> Result<QueryNode> {
        if raw.trim().is_empty() {
            return Err(PilumError::structural("raw query is empty"));
        }
        let mut clauses = Vec::new();
        for clause in raw.split_whitespace() {
            if let Some(node) = self.parse_clause(clause)? {
                clauses.push((node, Occur::Should));
            }
        }
        Ok(QueryNode::Boolean(BooleanGroupNode::new(clauses, false)))
    }
}
