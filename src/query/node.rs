//! Executable scoring tree.

use std::fmt::{self, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::{IndexAccess, Term};
use crate::query::field_boost::FieldBoost;
use crate::stats::{StatsCorrectionRegistry, TermIndex, TermStats, TermStatsTable};

/// Occurrence requirements for boolean clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Occur {
    /// The clause must match (equivalent to AND).
    Must,
    /// The clause should match (equivalent to OR).
    #[default]
    Should,
    /// The clause must not match (equivalent to NOT).
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// A node of the executable scoring tree.
#[derive(Debug, Clone)]
pub enum QueryNode {
    /// Term scored by corpus similarity over (corrected) statistics.
    Term(TermNode),
    /// Term scored by its field boost only.
    BoostOnlyTerm(BoostOnlyTermNode),
    /// Boolean combination of clauses.
    Boolean(BooleanGroupNode),
    /// Alternatives combined by maximum plus tie breaker.
    Disjunction(DisjunctionGroupNode),
    /// Subtree with a multiplied query boost.
    Boosted(BoostedNode),
    /// Matches every document with a constant score.
    MatchAll,
}

impl QueryNode {
    /// Wrap this node so its query boost is multiplied by `boost`.
    ///
    /// A boost of 1.0 returns the node unchanged.
    pub fn boosted(self, boost: f32) -> QueryNode {
        if boost == 1.0 {
            self
        } else {
            QueryNode::Boosted(BoostedNode {
                node: Box::new(self),
                boost,
            })
        }
    }

    /// A boolean group without children, matching nothing.
    pub fn empty() -> QueryNode {
        QueryNode::Boolean(BooleanGroupNode::new(Vec::new(), false))
    }

    /// Number of term leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            QueryNode::Term(_) | QueryNode::BoostOnlyTerm(_) => 1,
            QueryNode::Boolean(node) => node.children.iter().map(|(c, _)| c.leaf_count()).sum(),
            QueryNode::Disjunction(node) => node.children.iter().map(QueryNode::leaf_count).sum(),
            QueryNode::Boosted(node) => node.node.leaf_count(),
            QueryNode::MatchAll => 0,
        }
    }
}

impl Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term(node) => Display::fmt(node, f),
            QueryNode::BoostOnlyTerm(node) => Display::fmt(node, f),
            QueryNode::Boolean(node) => Display::fmt(node, f),
            QueryNode::Disjunction(node) => Display::fmt(node, f),
            QueryNode::Boosted(node) => Display::fmt(node, f),
            QueryNode::MatchAll => f.write_str("*:*"),
        }
    }
}

/// Leaf resolving its statistics through the registry it was registered with.
#[derive(Debug, Clone)]
pub struct TermNode {
    registry: Arc<StatsCorrectionRegistry>,
    term_index: TermIndex,
    term: Term,
    field_boost: Arc<dyn FieldBoost>,
}

impl TermNode {
    pub fn new(
        registry: Arc<StatsCorrectionRegistry>,
        term_index: TermIndex,
        term: Term,
        field_boost: Arc<dyn FieldBoost>,
    ) -> Self {
        TermNode {
            registry,
            term_index,
            term,
            field_boost,
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn term_index(&self) -> TermIndex {
        self.term_index
    }

    pub fn registry(&self) -> &Arc<StatsCorrectionRegistry> {
        &self.registry
    }

    pub fn field_boost(&self) -> &Arc<dyn FieldBoost> {
        &self.field_boost
    }

    /// Resolve this leaf's statistics, computing the registry's table on
    /// first access.
    pub fn resolve(&self, index: &dyn IndexAccess) -> Result<ResolvedTerm> {
        let table = self.registry.compute_stats(index)?;
        Ok(ResolvedTerm {
            table,
            term_index: self.term_index,
        })
    }
}

impl Display for TermNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

/// Statistics of one leaf, borrowed from the shared table.
#[derive(Debug, Clone)]
pub struct ResolvedTerm {
    table: Arc<TermStatsTable>,
    term_index: TermIndex,
}

impl ResolvedTerm {
    pub fn stats(&self) -> &TermStats {
        self.table.get(self.term_index)
    }
}

/// Leaf scoring `field boost * query boost` whenever the term matches.
#[derive(Debug, Clone)]
pub struct BoostOnlyTermNode {
    term: Term,
    field_boost: Arc<dyn FieldBoost>,
}

impl BoostOnlyTermNode {
    pub fn new(term: Term, field_boost: Arc<dyn FieldBoost>) -> Self {
        BoostOnlyTermNode { term, field_boost }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn field_boost(&self) -> &Arc<dyn FieldBoost> {
        &self.field_boost
    }
}

impl Display for BoostOnlyTermNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantScore({})", self.term)
    }
}

/// Boolean combination of clauses.
///
/// All MUST clauses are required. Without MUST clauses at least one SHOULD
/// clause has to match. A group of MUST_NOT clauses only matches nothing.
#[derive(Debug, Clone)]
pub struct BooleanGroupNode {
    children: Vec<(QueryNode, Occur)>,
    normalize_score: bool,
}

impl BooleanGroupNode {
    pub fn new(children: Vec<(QueryNode, Occur)>, normalize_score: bool) -> Self {
        BooleanGroupNode {
            children,
            normalize_score,
        }
    }

    pub fn children(&self) -> &[(QueryNode, Occur)] {
        &self.children
    }

    /// Whether the summed score is divided by the number of children.
    pub fn normalize_score(&self) -> bool {
        self.normalize_score
    }
}

impl Display for BooleanGroupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (child, occur)) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}{}", occur.prefix(), child)?;
        }
        f.write_str(")")?;
        if self.normalize_score && !self.children.is_empty() {
            write!(f, "^{}", 1.0 / self.children.len() as f32)?;
        }
        Ok(())
    }
}

/// Alternatives scored by `max + tie_breaker * (sum - max)`.
#[derive(Debug, Clone)]
pub struct DisjunctionGroupNode {
    children: Vec<QueryNode>,
    tie_breaker: f32,
}

impl DisjunctionGroupNode {
    pub fn new(children: Vec<QueryNode>, tie_breaker: f32) -> Self {
        DisjunctionGroupNode {
            children,
            tie_breaker,
        }
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }

    pub fn tie_breaker(&self) -> f32 {
        self.tie_breaker
    }
}

impl Display for DisjunctionGroupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")?;
        if self.tie_breaker != 0.0 {
            write!(f, "~{}", self.tie_breaker)?;
        }
        Ok(())
    }
}

/// A subtree whose query boost is multiplied.
#[derive(Debug, Clone)]
pub struct BoostedNode {
    node: Box<QueryNode>,
    boost: f32,
}

impl BoostedNode {
    pub fn node(&self) -> &QueryNode {
        &self.node
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }
}

impl Display for BoostedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})^{}", self.node, self.boost)
    }
}
