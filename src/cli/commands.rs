//! Command implementations for the pilum CLI.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::BuilderConfig;
use crate::error::{PilumError, Result};
use crate::index::IndexAccess;
use crate::index::memory::{MemoryDocument, MemoryIndex};
use crate::query::model::ExpandedQuery;
use crate::query::planner::{QueryPlanner, Ranking, SearchPlan};
use crate::stats::{CorrectionMode, TermStats};

/// Execute a CLI command.
pub fn execute_command(args: PilumArgs) -> Result<()> {
    match &args.command {
        Command::Search(search_args) => {
            let results = search(search_args)?;
            output_result(&results, &args)
        }
        Command::ExplainStats(query_args) => {
            let report = explain_stats(query_args)?;
            output_result(&report, &args)
        }
    }
}

/// Plan and run the query of `args`.
pub fn search(args: &SearchArgs) -> Result<SearchResults> {
    let (index, plan) = load_and_plan(&args.query)?;

    let start_time = Instant::now();
    let top = plan.execute(&index, args.start, args.rows, args.sort.clone().unwrap_or_default())?;
    let duration = start_time.elapsed();
    info!(
        total_hits = top.total_hits,
        duration_ms = duration.as_millis() as u64,
        "search finished"
    );

    Ok(SearchResults {
        query: plan.main_query().to_string(),
        reranked: matches!(plan.ranking, Ranking::Rerank(_)),
        total_hits: top.total_hits,
        start: args.start,
        hits: top.hits,
        duration_ms: duration.as_millis() as u64,
    })
}

/// Compute the statistics of the user query registry of `args`.
pub fn explain_stats(args: &QueryArgs) -> Result<StatsReport> {
    let (index, plan) = load_and_plan(args)?;
    let table = plan.registry.compute_stats(&index)?;

    let stats = table.all();
    let end_user_query = table.end_user_query().unwrap_or(usize::MAX);
    let first_clause = table.clause_offsets().first().copied().unwrap_or(stats.len());

    Ok(StatsReport {
        mode: match plan.registry.mode() {
            CorrectionMode::Corrected => "corrected".to_string(),
            CorrectionMode::Standard => "standard".to_string(),
        },
        unclaused: stats[..first_clause].iter().map(term_report).collect(),
        clauses: table
            .clause_ranges()
            .into_iter()
            .enumerate()
            .map(|(clause, range)| ClauseReport {
                clause,
                user: range.start < end_user_query,
                terms: stats[range].iter().map(term_report).collect(),
            })
            .collect(),
    })
}

fn term_report(stats: &TermStats) -> TermReport {
    TermReport {
        term: stats.term().to_string(),
        raw_doc_freq: stats.raw_doc_freq(),
        corrected_doc_freq: stats.corrected_doc_freq(),
        never_match: stats.is_never_match(),
    }
}

fn load_and_plan(args: &QueryArgs) -> Result<(MemoryIndex, SearchPlan)> {
    let params: HashMap<String, String> = args.params.iter().cloned().collect();
    let config = BuilderConfig::from_params(&params)?;
    let expanded = load_query(&args.query)?;
    let index = load_index(&args.index, args.segment_size)?;
    info!(documents = index.max_doc(), segments = index.segment_count(), "index loaded");

    let plan = QueryPlanner::new(config)?.plan(&expanded)?;
    Ok((index, plan))
}

/// Load a JSON array of documents into an in-memory index.
pub fn load_index(path: &Path, segment_size: usize) -> Result<MemoryIndex> {
    if segment_size == 0 {
        return Err(PilumError::configuration("segment size must be positive"));
    }
    let documents: Vec<MemoryDocument> = serde_json::from_str(&fs::read_to_string(path)?)?;
    let mut builder = MemoryIndex::builder().max_segment_docs(segment_size);
    builder.add_documents(documents);
    builder.build()
}

/// Load a rewritten query from a JSON file.
pub fn load_query(path: &Path) -> Result<ExpandedQuery> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}
