//! Command implementations for the feature logger CLI.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::time::Instant;

use log::{debug, info};

use crate::backend::{InMemoryBackend, SearchBackend};
use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::Result;
use crate::ltr::{FeatureLogger, LtrModelConfig};
use crate::query::TemplateParams;

/// Execute a CLI command, writing its output to stdout.
pub fn execute_command(args: LoggerArgs) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_command(&args, &mut out)
}

/// Execute a CLI command, writing its output to `out`.
pub fn run_command(args: &LoggerArgs, out: &mut dyn Write) -> Result<()> {
    match &args.command {
        Command::Extract(extract_args) => extract_features(extract_args, args, out),
        Command::Inspect(inspect_args) => inspect_config(inspect_args, args, out),
    }
}

/// Log feature vectors for the requested documents.
fn extract_features(args: &ExtractArgs, cli_args: &LoggerArgs, out: &mut dyn Write) -> Result<()> {
    let config = LtrModelConfig::from_file(&args.config)?;
    info!(
        "loaded {} feature extractors from {}",
        config.len(),
        args.config.display()
    );

    let params = parse_params(&args.params)?;
    let backend = open_backend(&args.index, &args.backend)?;
    let feature_names = config
        .feature_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let logger = FeatureLogger::new(backend, args.index.as_str(), config);

    let start_time = Instant::now();
    let features = logger.extract_features(&params, &args.doc_ids)?;
    let duration = start_time.elapsed();

    let missing = args
        .doc_ids
        .iter()
        .filter(|id| !features.contains_key(id.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    output_result(
        &ExtractionResult {
            index: args.index.clone(),
            feature_names,
            features,
            missing,
            duration_ms: duration.as_millis() as u64,
        },
        out,
        cli_args,
    )
}

/// Describe the extractors of a model configuration.
fn inspect_config(args: &InspectArgs, cli_args: &LoggerArgs, out: &mut dyn Write) -> Result<()> {
    let config = LtrModelConfig::from_file(&args.config)?;

    let mut all_placeholders = BTreeSet::new();
    let mut extractors = Vec::with_capacity(config.len());
    for (position, extractor) in config.feature_extractors().iter().enumerate() {
        let placeholders = extractor.placeholders()?;
        all_placeholders.extend(placeholders.iter().cloned());
        extractors.push(ExtractorSummary {
            position,
            feature_name: extractor.feature_name().to_string(),
            query_kind: extractor.query().kind().to_string(),
            default_score: extractor.default_score(),
            placeholders: placeholders.into_iter().collect(),
        });
    }

    output_result(
        &ConfigSummary {
            extractors,
            placeholders: all_placeholders.into_iter().collect(),
            duplicate_feature_names: config
                .duplicate_feature_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
        out,
        cli_args,
    )
}

/// Parse `name=value` assignments into template parameters.
pub fn parse_params(assignments: &[String]) -> Result<TemplateParams> {
    let mut params = TemplateParams::new();
    for assignment in assignments {
        let (name, value) = TemplateParams::parse_assignment(assignment)?;
        params.insert(name, value);
    }
    Ok(params)
}

/// Build the backend selected on the command line.
fn open_backend(index: &str, args: &BackendArgs) -> Result<Box<dyn SearchBackend>> {
    if let Some(path) = &args.documents {
        let backend = InMemoryBackend::new();
        let file = File::open(path)?;
        let loaded = backend.load_jsonl(index, BufReader::new(file), &args.id_field)?;
        debug!("loaded {loaded} documents from {}", path.display());
        return Ok(Box::new(backend));
    }
    open_http_backend(args)
}

#[cfg(feature = "http")]
fn open_http_backend(args: &BackendArgs) -> Result<Box<dyn SearchBackend>> {
    use crate::backend::{HttpBackend, HttpBackendConfig};

    let mut config = HttpBackendConfig {
        username: args.username.clone(),
        password: args.password.clone(),
        api_key: args.api_key.clone(),
        timeout_secs: args.timeout,
        ..Default::default()
    };
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    debug!("using HTTP backend at {}", config.url);
    Ok(Box::new(HttpBackend::new(config)?))
}

#[cfg(not(feature = "http"))]
fn open_http_backend(_args: &BackendArgs) -> Result<Box<dyn SearchBackend>> {
    Err(crate::error::LtrError::invalid_argument(
        "built without the http feature; use --documents",
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use clap::Parser;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;
    use crate::error::LtrError;

    fn write_file(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    fn fixtures(dir: &Path) -> (String, String) {
        let config = json!({"learning_to_rank": {"feature_extractors": [
            {"query_extractor": {"feature_name": "title_bm25", "query": {"match": {"title": "{{query}}"}}}},
            {"query_extractor": {"feature_name": "has_year", "query": {"exists": {"field": "year"}}}},
            {"query_extractor": {"feature_name": "title_bm25", "query": {"match": {"title": "{{query}}"}}, "default_score": -1.0}}
        ]}});
        let config = write_file(dir, "model.json", &config.to_string());
        let documents = write_file(
            dir,
            "docs.jsonl",
            "{\"id\": \"a\", \"title\": \"The Matrix\", \"year\": 1999}\n\
             {\"id\": \"b\", \"title\": \"The Godfather\"}\n",
        );
        (config, documents)
    }

    fn run(argv: &[&str]) -> Result<String> {
        let args = LoggerArgs::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        run_command(&args, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_extract_json() {
        let dir = TempDir::new().unwrap();
        let (config, documents) = fixtures(dir.path());

        let output = run(&[
            "ltr-feature-logger",
            "--format",
            "json",
            "extract",
            "--config",
            &config,
            "--index",
            "movies",
            "--documents",
            &documents,
            "--param",
            "query=matrix",
            "a",
            "b",
            "zzz",
        ])
        .unwrap();

        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["feature_names"], json!(["title_bm25", "has_year", "title_bm25"]));
        assert_eq!(value["missing"], json!(["zzz"]));

        let a = value["features"]["a"].as_array().unwrap();
        assert!(a[0].as_f64().unwrap() > 0.0);
        assert_eq!(a[1].as_f64(), Some(1.0));
        assert_eq!(a[0], a[2]);

        assert_eq!(value["features"]["b"], json!([0.0, 0.0, -1.0]));
    }

    #[test]
    fn test_extract_human() {
        let dir = TempDir::new().unwrap();
        let (config, documents) = fixtures(dir.path());

        let output = run(&[
            "ltr-feature-logger",
            "extract",
            "-c",
            &config,
            "-i",
            "movies",
            "-d",
            &documents,
            "-p",
            "query=godfather",
            "b",
            "missing",
        ])
        .unwrap();

        let mut lines = output.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("doc_id"));
        assert!(header.contains("has_year"));
        assert!(lines.next().unwrap().starts_with("b "));
        assert!(output.contains("Not found: missing"));
    }

    #[test]
    fn test_extract_missing_param() {
        let dir = TempDir::new().unwrap();
        let (config, documents) = fixtures(dir.path());

        let result = run(&[
            "ltr-feature-logger",
            "extract",
            "-c",
            &config,
            "-i",
            "movies",
            "-d",
            &documents,
            "a",
        ]);
        assert!(matches!(result, Err(LtrError::Template(_))));
    }

    #[test]
    fn test_extract_unknown_index_file() {
        let dir = TempDir::new().unwrap();
        let (config, _) = fixtures(dir.path());
        let missing = dir.path().join("nope.jsonl");

        let result = run(&[
            "ltr-feature-logger",
            "extract",
            "-c",
            &config,
            "-i",
            "movies",
            "-d",
            &missing.to_string_lossy(),
            "a",
        ]);
        assert!(matches!(result, Err(LtrError::Io(_))));
    }

    #[test]
    fn test_inspect() {
        let dir = TempDir::new().unwrap();
        let (config, _) = fixtures(dir.path());

        let output = run(&["ltr-feature-logger", "inspect", &config]).unwrap();
        assert!(output.contains("Features (3):"));
        assert!(output.contains("[1] has_year (exists)"));
        assert!(output.contains("Template parameters: query"));
        assert!(output.contains("duplicate feature names: title_bm25"));

        let output = run(&["ltr-feature-logger", "-f", "json", "inspect", &config]).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["placeholders"], json!(["query"]));
        assert_eq!(value["extractors"][2]["default_score"], json!(-1.0));
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["query=the matrix".to_string(), "year=1999".to_string()])
            .unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("query").unwrap().to_string(), "the matrix");

        assert!(parse_params(&["novalue".to_string()]).is_err());
    }
}
