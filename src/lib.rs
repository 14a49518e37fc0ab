//! # Pilum
//!
//! Query building with corrected term statistics for rewritten search
//! queries.
//!
//! ## Features
//!
//! - Document frequency correction across query alternatives (synonyms,
//!   decompounds) so that rare alternatives do not outrank the user's term
//! - Two-phase query tree construction sharing one statistics registry
//!   between the user query, filters and boost queries
//! - Fixed, probabilistic (PRMS) and disabled per-field weighting
//! - Boost queries applied as optional clauses or by two-pass re-ranking
//! - In-memory segmented index and a BM25 executor with parallel segment
//!   search

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod search;
pub mod stats;

pub mod prelude {
    pub use crate::config::{BoostMethod, BoostSimilarity, BuilderConfig, FieldBoostModel};
    pub use crate::error::{PilumError, Result};
    pub use crate::index::memory::{MemoryDocument, MemoryIndex};
    pub use crate::index::{IndexAccess, Term};
    pub use crate::query::model::{
        BooleanQuery, DisjunctionMaxQuery, ExpandedQuery, QueryTerm, RewrittenQuery,
    };
    pub use crate::query::{Occur, QueryNode, QueryPlanner, QueryTreeBuilder, SearchPlan};
    pub use crate::search::{SearchRequest, Searcher, SortField, TopDocs, TwoPassReRanker};
    pub use crate::stats::{CorrectionMode, StatsCorrectionRegistry};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
