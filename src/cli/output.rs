//! Output formatting for CLI commands.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::cli::args::{LoggerArgs, OutputFormat};
use crate::error::Result;
use crate::ltr::DocumentFeatures;

/// Result structure for feature extraction.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub index: String,
    pub feature_names: Vec<String>,
    pub features: DocumentFeatures,
    /// Requested ids the index does not contain.
    pub missing: Vec<String>,
    pub duration_ms: u64,
}

/// Description of a model configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub extractors: Vec<ExtractorSummary>,
    pub placeholders: Vec<String>,
    pub duplicate_feature_names: Vec<String>,
}

/// Description of one extractor.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractorSummary {
    pub position: usize,
    pub feature_name: String,
    pub query_kind: String,
    pub default_score: f64,
    pub placeholders: Vec<String>,
}

/// Something the CLI can print.
pub trait Report: Serialize {
    fn write_human(&self, out: &mut dyn Write, args: &LoggerArgs) -> Result<()>;
}

/// Output a result in the specified format.
pub fn output_result<T: Report>(result: &T, out: &mut dyn Write, args: &LoggerArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => result.write_human(out, args),
        OutputFormat::Json => output_json(result, out, args),
    }
}

fn output_json<T: Serialize>(result: &T, out: &mut dyn Write, args: &LoggerArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    writeln!(out, "{json}")?;
    Ok(())
}

impl Report for ExtractionResult {
    fn write_human(&self, out: &mut dyn Write, args: &LoggerArgs) -> Result<()> {
        if args.verbosity() > 1 {
            writeln!(
                out,
                "Logged {} features for {} documents of {} in {}ms",
                self.feature_names.len(),
                self.features.len(),
                self.index,
                self.duration_ms
            )?;
        }

        let id_width = self
            .features
            .keys()
            .chain(self.missing.iter())
            .map(|id| id.len())
            .chain(std::iter::once("doc_id".len()))
            .max()
            .unwrap_or(0);

        write!(out, "{:<id_width$}", "doc_id")?;
        for name in &self.feature_names {
            write!(out, "  {name:>12}")?;
        }
        writeln!(out)?;

        for (id, vector) in &self.features {
            write!(out, "{id:<id_width$}")?;
            for value in vector {
                write!(out, "  {value:>12.6}")?;
            }
            writeln!(out)?;
        }

        if !self.missing.is_empty() && args.verbosity() > 0 {
            writeln!(out)?;
            writeln!(out, "Not found: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

impl Report for ConfigSummary {
    fn write_human(&self, out: &mut dyn Write, _args: &LoggerArgs) -> Result<()> {
        writeln!(out, "Features ({}):", self.extractors.len())?;
        for extractor in &self.extractors {
            write!(
                out,
                "  [{}] {} ({})",
                extractor.position, extractor.feature_name, extractor.query_kind
            )?;
            if extractor.default_score != 0.0 {
                write!(out, " default={}", extractor.default_score)?;
            }
            if !extractor.placeholders.is_empty() {
                write!(out, " params: {}", extractor.placeholders.join(", "))?;
            }
            writeln!(out)?;
        }

        if !self.placeholders.is_empty() {
            writeln!(out, "Template parameters: {}", self.placeholders.join(", "))?;
        }
        if !self.duplicate_feature_names.is_empty() {
            writeln!(
                out,
                "Warning: duplicate feature names: {}",
                self.duplicate_feature_names.join(", ")
            )?;
        }
        Ok(())
    }
}
