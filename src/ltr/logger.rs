//! Feature logging against a search backend.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::backend::{SearchBackend, SearchRequest};
use crate::error::{LtrError, Result};
use crate::ltr::config::LtrModelConfig;
use crate::query::{BoolQuery, QueryDsl, TemplateParams};

/// Feature vectors keyed by document id. Every vector holds one value per
/// extractor, in configuration order.
pub type DocumentFeatures = BTreeMap<String, Vec<f64>>;

/// Extracts feature vectors for documents of one index.
///
/// # Examples
///
/// ```
/// use ltr_feature_logger::backend::InMemoryBackend;
/// use ltr_feature_logger::ltr::{FeatureLogger, LtrModelConfig, QueryFeatureExtractor};
/// use ltr_feature_logger::query::{QueryDsl, TemplateParams};
/// use serde_json::json;
///
/// # fn main() -> ltr_feature_logger::error::Result<()> {
/// let backend = InMemoryBackend::new();
/// backend.index_document("movies", "tt0133093", json!({"title": "The Matrix"}))?;
///
/// let config = LtrModelConfig::new(vec![QueryFeatureExtractor::new(
///     "title_bm25",
///     QueryDsl::match_query("title", "{{query}}"),
/// )?]);
/// let logger = FeatureLogger::new(backend, "movies", config);
///
/// let features = logger.extract_features(
///     &TemplateParams::new().with("query", "matrix"),
///     &["tt0133093"],
/// )?;
/// assert!(features["tt0133093"][0] > 0.0);
/// # Ok(())
/// # }
/// ```
pub struct FeatureLogger<B> {
    backend: B,
    index: String,
    config: LtrModelConfig,
}

impl<B: SearchBackend> FeatureLogger<B> {
    pub fn new<S: Into<String>>(backend: B, index: S, config: LtrModelConfig) -> Self {
        let duplicates = config.duplicate_feature_names();
        if !duplicates.is_empty() {
            warn!(
                "duplicate feature names in model config: {}; vectors stay positional",
                duplicates.join(", ")
            );
        }
        FeatureLogger {
            backend,
            index: index.into(),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn config(&self) -> &LtrModelConfig {
        &self.config
    }

    /// Build the search request that scores every extractor for `doc_ids`.
    ///
    /// Each rendered query is wrapped in a bool query named after its
    /// position. The wrappers are `should` clauses of one bool query whose
    /// filter restricts the hits to the requested ids.
    pub fn build_request<S: AsRef<str>>(
        &self,
        params: &TemplateParams,
        doc_ids: &[S],
    ) -> Result<SearchRequest> {
        let ids = unique_ids(doc_ids)?;
        let mut query = BoolQuery::new();
        for (position, extractor) in self.config.feature_extractors().iter().enumerate() {
            let rendered = extractor.render(params)?;
            query = query.should(BoolQuery::new().must(rendered).named(position.to_string()).build());
        }
        let size = ids.len();
        let query = query.filter(QueryDsl::ids(ids)).build();
        Ok(SearchRequest::new(query)
            .with_size(size)
            .without_source()
            .with_named_queries_score())
    }

    /// Extract the feature vectors of `doc_ids`.
    ///
    /// Ids missing from the index are absent from the result. Extractors a
    /// document does not match contribute their default score.
    pub fn extract_features<S: AsRef<str>>(
        &self,
        params: &TemplateParams,
        doc_ids: &[S],
    ) -> Result<DocumentFeatures> {
        let request = self.build_request(params, doc_ids)?;
        debug!(
            "logging {} features for {} documents of {} via {}",
            self.config.len(),
            request.size,
            self.index,
            self.backend.name()
        );
        let response = self.backend.search(&self.index, &request)?;

        let defaults: Vec<f64> = self
            .config
            .feature_extractors()
            .iter()
            .map(|extractor| extractor.default_score())
            .collect();

        let mut features = DocumentFeatures::new();
        for hit in response.hits {
            let mut vector = defaults.clone();
            for (name, score) in &hit.matched_queries {
                match name.parse::<usize>().ok().filter(|&p| p < vector.len()) {
                    Some(position) => vector[position] = *score,
                    None => warn!("ignoring unknown named query {name:?} on document {}", hit.id),
                }
            }
            features.insert(hit.id, vector);
        }
        debug!("extracted features for {} documents", features.len());
        Ok(features)
    }
}

fn unique_ids<S: AsRef<str>>(doc_ids: &[S]) -> Result<Vec<String>> {
    if doc_ids.is_empty() {
        return Err(LtrError::invalid_argument("doc_ids must not be empty"));
    }
    let mut seen = BTreeSet::new();
    Ok(doc_ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect())
}
