//! Criterion benchmarks for ltr-feature-logger.
//!
//! Covers the hot paths of a logging call:
//! - Text analysis
//! - Template rendering
//! - Feature extraction against the in-memory backend

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ltr_feature_logger::backend::InMemoryBackend;
use ltr_feature_logger::backend::analysis::StandardAnalyzer;
use ltr_feature_logger::ltr::{FeatureLogger, LtrModelConfig, QueryFeatureExtractor};
use ltr_feature_logger::query::template;
use ltr_feature_logger::query::{QueryDsl, Script, TemplateParams};
use serde_json::json;

const WORDS: [&str; 16] = [
    "search", "engine", "ranking", "feature", "matrix", "query", "document", "score",
    "learning", "model", "vector", "relevance", "training", "index", "field", "term",
];

/// Generate test documents for benchmarking.
fn generate_titles(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let length = 3 + (i % 12);
            (0..length)
                .map(|j| WORDS[(i * 7 + j * 13) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn create_backend(count: usize) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    for (i, title) in generate_titles(count).into_iter().enumerate() {
        backend
            .index_document(
                "bench",
                format!("doc{i}"),
                json!({"title": title, "popularity": (i % 100) as f64 / 10.0}),
            )
            .unwrap();
    }
    backend
}

fn create_config() -> LtrModelConfig {
    LtrModelConfig::new(vec![
        QueryFeatureExtractor::from_json("title_bm25", &json!({"match": {"title": "{{query}}"}}))
            .unwrap(),
        QueryFeatureExtractor::from_json(
            "title_and",
            &json!({"match": {"title": {"query": "{{query}}", "operator": "and"}}}),
        )
        .unwrap(),
        QueryFeatureExtractor::new(
            "popularity",
            QueryDsl::script_score(
                QueryDsl::exists("popularity"),
                Script::new("Math.log1p(doc['popularity'].value)"),
            ),
        )
        .unwrap(),
    ])
}

/// Benchmark text analysis.
fn bench_text_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_analysis");
    let analyzer = StandardAnalyzer::new();
    let titles = generate_titles(100);

    group.throughput(Throughput::Elements(titles.len() as u64));
    group.bench_function("analyze_titles", |b| {
        b.iter(|| {
            for title in &titles {
                black_box(analyzer.analyze(black_box(title)));
            }
        })
    });

    group.finish();
}

/// Benchmark template rendering.
fn bench_template_rendering(c: &mut Criterion) {
    let template = json!({"bool": {
        "must": [{"match": {"title": "{{query}}"}}],
        "filter": [{"range": {"year": {"gte": "{{min_year}}", "lte": "{{max_year}}"}}}]
    }});
    let params = TemplateParams::new()
        .with("query", "the matrix")
        .with("min_year", 1990)
        .with("max_year", 2005);

    c.bench_function("render_template", |b| {
        b.iter(|| black_box(template::render(black_box(&template), &params).unwrap()))
    });
}

/// Benchmark feature extraction for growing batches of documents.
fn bench_feature_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_extraction");
    let logger = FeatureLogger::new(create_backend(10_000), "bench", create_config());
    let params = TemplateParams::new().with("query", "matrix ranking");

    for batch in [10usize, 100, 1000] {
        let ids: Vec<String> = (0..batch).map(|i| format!("doc{}", i * 7)).collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &ids, |b, ids| {
            b.iter(|| black_box(logger.extract_features(&params, ids).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_text_analysis,
    bench_template_rendering,
    bench_feature_extraction
);
criterion_main!(benches);
