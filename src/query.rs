//! Query input model and construction of scoring trees.
//!
//! An [`ExpandedQuery`] is turned into [`QueryNode`] trees by a
//! [`QueryTreeBuilder`]. The [`QueryPlanner`] drives builders for the user
//! query, filters and boost queries and decides how boosts are applied.

pub mod builder;
pub mod field_boost;
pub mod model;
pub mod node;
pub mod planner;
pub mod raw;

pub use self::builder::QueryTreeBuilder;
pub use self::field_boost::{FieldBoost, SearchFieldsAndBoosting};
pub use self::model::{BooleanQuery, BoostQuery, ExpandedQuery, RewrittenQuery};
pub use self::node::{Occur, QueryNode};
pub use self::planner::{QueryPlanner, Ranking, SearchPlan};
pub use self::raw::{FieldValueParser, RawQueryParser};
