//! Command line argument parsing for the pilum CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::search::collector::{SortField, SortOrder};

/// Pilum - corrected-statistics query building and two-pass ranking
#[derive(Parser, Debug, Clone)]
#[command(name = "pilum")]
#[command(about = "Build and run rewritten queries with corrected term statistics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PilumArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PilumArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Default log filter for the effective verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Plan and run a rewritten query against a document file
    Search(SearchArgs),

    /// Show raw and corrected document frequencies per clause
    #[command(name = "explain-stats")]
    ExplainStats(QueryArgs),
}

/// Inputs shared by all commands.
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Documents to index (JSON array of documents)
    #[arg(short, long, value_name = "INDEX_FILE")]
    pub index: PathBuf,

    /// Rewritten query (JSON)
    #[arg(short = 'Q', long, value_name = "QUERY_FILE")]
    pub query: PathBuf,

    /// Builder parameter, e.g. `-p qf="title^2 body"` (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Documents per index segment
    #[arg(long, default_value = "10000")]
    pub segment_size: usize,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Offset of the first hit
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Number of hits to return
    #[arg(short, long, default_value = "10")]
    pub rows: usize,

    /// Sort by a numeric value instead of score, e.g. `price:asc`
    #[arg(short, long, value_name = "FIELD[:asc|desc]", value_parser = parse_sort)]
    pub sort: Option<SortField>,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn parse_key_val(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{value}'"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{value}'"));
    }
    Ok((key.trim().to_string(), val.to_string()))
}

fn parse_sort(value: &str) -> Result<SortField, String> {
    let (name, order) = match value.split_once(':') {
        Some((name, "asc")) => (name, SortOrder::Asc),
        Some((name, "desc")) => (name, SortOrder::Desc),
        Some((_, order)) => return Err(format!("unknown sort order '{order}'")),
        None => (value, SortOrder::Desc),
    };
    if name.is_empty() {
        return Err("sort field name is empty".to_string());
    }
    Ok(SortField::field(name, order))
}
