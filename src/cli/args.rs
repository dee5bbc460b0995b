//! Command line argument parsing for the feature logger CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Extract learning-to-rank feature vectors from a search index
#[derive(Parser, Debug, Clone)]
#[command(name = "ltr-feature-logger")]
#[command(about = "Extract learning-to-rank feature vectors from a search index")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct LoggerArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl LoggerArgs {
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
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log feature vectors for a set of documents
    Extract(ExtractArgs),

    /// Describe a model configuration
    Inspect(InspectArgs),
}

/// Arguments for extracting features
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Model configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: PathBuf,

    /// Index to query
    #[arg(short, long)]
    pub index: String,

    /// Template parameter as name=value (repeatable)
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Document ids to log features for
    #[arg(value_name = "DOC_ID", required = true)]
    pub doc_ids: Vec<String>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

/// Where searches are executed
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Base URL of an Elasticsearch-compatible cluster
    #[arg(long, env = "LTR_URL", conflicts_with = "documents")]
    pub url: Option<String>,

    /// Basic auth user name
    #[arg(long, env = "LTR_USERNAME", requires = "url")]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "LTR_PASSWORD")]
    pub password: Option<String>,

    /// API key
    #[arg(long, env = "LTR_API_KEY", requires = "url")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// JSONL file of documents loaded into an in-memory index instead
    #[arg(short, long, value_name = "DOCUMENTS_FILE")]
    pub documents: Option<PathBuf>,

    /// Field holding the document id in the JSONL file
    #[arg(long, default_value = "id")]
    pub id_field: String,
}

/// Arguments for inspecting a model configuration
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Model configuration file (JSON)
    #[arg(value_name = "CONFIG_FILE")]
    pub config: PathBuf,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
