//! Rewritten query input.
//!
//! The rewrite pipeline hands over an [`ExpandedQuery`]: the user query with
//! its alternatives, plus filter and boost queries injected by rewrite rules.
//! Structured queries are trees of boolean groups and alternative groups
//! (disjunctions of terms); raw queries are opaque strings passed through to
//! a [`RawQueryParser`](crate::query::raw::RawQueryParser).
//!
//! The model is serde-loadable. Clauses are tagged by `type`:
//!
//! ```json
//! {
//!   "clauses": [
//!     { "type": "disjunction", "occur": "SHOULD", "clauses": [
//!       { "type": "term", "value": "laptop" },
//!       { "type": "term", "value": "notebook", "generated": true }
//!     ]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::query::node::Occur;

/// Raw user query strings that match all documents.
pub const MATCH_ALL_QUERIES: [&str; 2] = ["*", "*:*"];

/// A structured or raw (pass-through) query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewrittenQuery {
    Raw(String),
    Query(BooleanQuery),
}

impl RewrittenQuery {
    /// Check whether this is a raw match-all query.
    pub fn is_match_all(&self) -> bool {
        matches!(self, RewrittenQuery::Raw(raw) if MATCH_ALL_QUERIES.contains(&raw.trim()))
    }
}

impl From<BooleanQuery> for RewrittenQuery {
    fn from(query: BooleanQuery) -> Self {
        RewrittenQuery::Query(query)
    }
}

/// A query injected to boost (or penalize) matching documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostQuery {
    pub query: RewrittenQuery,
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl BoostQuery {
    pub fn new(query: impl Into<RewrittenQuery>, boost: f32) -> Self {
        BoostQuery {
            query: query.into(),
            boost,
        }
    }
}

/// Output of the rewrite pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub user_query: RewrittenQuery,
    #[serde(default)]
    pub filter_queries: Vec<RewrittenQuery>,
    #[serde(default)]
    pub boost_up_queries: Vec<BoostQuery>,
    #[serde(default)]
    pub boost_down_queries: Vec<BoostQuery>,
}

impl ExpandedQuery {
    pub fn new(user_query: impl Into<RewrittenQuery>) -> Self {
        ExpandedQuery {
            user_query: user_query.into(),
            filter_queries: Vec::new(),
            boost_up_queries: Vec::new(),
            boost_down_queries: Vec::new(),
        }
    }

    pub fn with_filter(mut self, query: impl Into<RewrittenQuery>) -> Self {
        self.filter_queries.push(query.into());
        self
    }

    pub fn with_boost_up(mut self, query: impl Into<RewrittenQuery>, boost: f32) -> Self {
        self.boost_up_queries.push(BoostQuery::new(query, boost));
        self
    }

    pub fn with_boost_down(mut self, query: impl Into<RewrittenQuery>, boost: f32) -> Self {
        self.boost_down_queries.push(BoostQuery::new(query, boost));
        self
    }
}

/// A boolean group of clauses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BooleanQuery {
    pub clauses: Vec<Clause>,
    #[serde(default)]
    pub occur: Occur,
    /// Whether the group was produced by a rewrite rule.
    #[serde(default)]
    pub generated: bool,
}

impl BooleanQuery {
    /// Create an empty group.
    pub fn new(occur: Occur, generated: bool) -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            occur,
            generated,
        }
    }

    /// One SHOULD alternative group per whitespace separated word.
    pub fn from_text(text: &str) -> Self {
        let mut query = BooleanQuery::default();
        for word in text.split_whitespace() {
            query = query.with_clause(DisjunctionMaxQuery::of_terms(Occur::Should, [word]));
        }
        query
    }

    pub fn with_clause(mut self, clause: impl Into<Clause>) -> Self {
        self.clauses.push(clause.into());
        self
    }
}

/// A clause of a boolean group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    Boolean(BooleanQuery),
    Disjunction(DisjunctionMaxQuery),
}

impl From<BooleanQuery> for Clause {
    fn from(query: BooleanQuery) -> Self {
        Clause::Boolean(query)
    }
}

impl From<DisjunctionMaxQuery> for Clause {
    fn from(query: DisjunctionMaxQuery) -> Self {
        Clause::Disjunction(query)
    }
}

/// An alternative group: the variants of one original query position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisjunctionMaxQuery {
    pub clauses: Vec<DisjunctionClause>,
    #[serde(default)]
    pub occur: Occur,
}

impl DisjunctionMaxQuery {
    pub fn new(occur: Occur) -> Self {
        DisjunctionMaxQuery {
            clauses: Vec::new(),
            occur,
        }
    }

    /// Group of user (non-generated) terms without field.
    pub fn of_terms<I, S>(occur: Occur, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DisjunctionMaxQuery {
            clauses: values
                .into_iter()
                .map(|value| DisjunctionClause::Term(QueryTerm::new(value)))
                .collect(),
            occur,
        }
    }

    pub fn with_clause(mut self, clause: impl Into<DisjunctionClause>) -> Self {
        self.clauses.push(clause.into());
        self
    }
}

/// A variant inside an alternative group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisjunctionClause {
    Term(QueryTerm),
    Boolean(BooleanQuery),
}

impl From<QueryTerm> for DisjunctionClause {
    fn from(term: QueryTerm) -> Self {
        DisjunctionClause::Term(term)
    }
}

impl From<BooleanQuery> for DisjunctionClause {
    fn from(query: BooleanQuery) -> Self {
        DisjunctionClause::Boolean(query)
    }
}

/// A term of the rewritten query, before analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTerm {
    /// Restricts the term to one field. Without it the term is searched in
    /// all query fields.
    #[serde(default)]
    pub field: Option<String>,
    pub value: String,
    #[serde(default)]
    pub generated: bool,
}

impl QueryTerm {
    pub fn new(value: impl Into<String>) -> Self {
        QueryTerm {
            field: None,
            value: value.into(),
            generated: false,
        }
    }

    /// A term produced by a rewrite rule.
    pub fn generated(value: impl Into<String>) -> Self {
        QueryTerm {
            generated: true,
            ..QueryTerm::new(value)
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}
