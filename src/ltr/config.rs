//! LTR model configuration.
//!
//! The configuration serializes to the inference configuration shape used by
//! Elasticsearch trained models:
//!
//! ```json
//! {
//!   "learning_to_rank": {
//!     "feature_extractors": [
//!       {"query_extractor": {"feature_name": "title_bm25", "query": {"match": {"title": "{{query}}"}}}}
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use ahash::AHashMap;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::ltr::extractor::QueryFeatureExtractor;

/// Ordered list of feature extractors. Position `i` of every feature vector
/// is produced by extractor `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigDocument", into = "ConfigDocument")]
pub struct LtrModelConfig {
    feature_extractors: Vec<QueryFeatureExtractor>,
}

impl LtrModelConfig {
    pub fn new(feature_extractors: Vec<QueryFeatureExtractor>) -> Self {
        LtrModelConfig { feature_extractors }
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read model config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse model config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn feature_extractors(&self) -> &[QueryFeatureExtractor] {
        &self.feature_extractors
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.feature_extractors
            .iter()
            .map(QueryFeatureExtractor::feature_name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.feature_extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_extractors.is_empty()
    }

    /// Position of the extractor named `name`. When a name is used more than
    /// once the last position wins.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_extractors
            .iter()
            .rposition(|extractor| extractor.feature_name() == name)
    }

    /// Feature names used by more than one extractor, in first-seen order.
    pub fn duplicate_feature_names(&self) -> Vec<&str> {
        let mut counts: AHashMap<&str, usize> = AHashMap::new();
        for name in self.feature_names() {
            *counts.entry(name).or_insert(0) += 1;
        }
        let mut seen = BTreeSet::new();
        self.feature_names()
            .into_iter()
            .filter(|name| counts[name] > 1 && seen.insert(*name))
            .collect()
    }
}

impl FromIterator<QueryFeatureExtractor> for LtrModelConfig {
    fn from_iter<I: IntoIterator<Item = QueryFeatureExtractor>>(iter: I) -> Self {
        LtrModelConfig::new(iter.into_iter().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct ConfigDocument {
    learning_to_rank: ConfigBody,
}

#[derive(Serialize, Deserialize)]
struct ConfigBody {
    #[serde(default)]
    feature_extractors: Vec<QueryFeatureExtractor>,
}

impl From<ConfigDocument> for LtrModelConfig {
    fn from(document: ConfigDocument) -> Self {
        LtrModelConfig::new(document.learning_to_rank.feature_extractors)
    }
}

impl From<LtrModelConfig> for ConfigDocument {
    fn from(config: LtrModelConfig) -> Self {
        ConfigDocument {
            learning_to_rank: ConfigBody {
                feature_extractors: config.feature_extractors,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::error::LtrError;
    use crate::query::QueryDsl;

    fn extractor(name: &str) -> QueryFeatureExtractor {
        QueryFeatureExtractor::new(name, QueryDsl::match_all()).unwrap()
    }

    #[test]
    fn test_order_preserved() {
        let config = LtrModelConfig::new(vec![extractor("b"), extractor("a"), extractor("c")]);
        assert_eq!(config.len(), 3);
        assert_eq!(config.feature_names(), vec!["b", "a", "c"]);
        assert_eq!(config.feature_index("a"), Some(1));
        assert_eq!(config.feature_index("missing"), None);
    }

    #[test]
    fn test_duplicates() {
        let config = LtrModelConfig::new(vec![
            extractor("a"),
            extractor("b"),
            extractor("a"),
            extractor("b"),
            extractor("c"),
        ]);
        assert_eq!(config.len(), 5);
        assert_eq!(config.duplicate_feature_names(), vec!["a", "b"]);
        assert_eq!(config.feature_index("a"), Some(2));
        assert_eq!(config.feature_index("b"), Some(3));
    }

    #[test]
    fn test_empty() {
        let config = LtrModelConfig::default();
        assert!(config.is_empty());
        assert!(config.duplicate_feature_names().is_empty());
    }

    #[test]
    fn test_from_json_str() {
        let config = LtrModelConfig::from_json_str(
            r#"{
                "learning_to_rank": {
                    "feature_extractors": [
                        {"query_extractor": {"feature_name": "title_bm25", "query": {"match": {"title": "{{query}}"}}}},
                        {"query_extractor": {"feature_name": "popular", "query": {"exists": {"field": "popularity"}}, "default_score": -1}}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.feature_names(), vec!["title_bm25", "popular"]);
        assert_eq!(config.feature_extractors()[0].default_score(), 0.0);
        assert_eq!(config.feature_extractors()[1].default_score(), -1.0);
    }

    #[test]
    fn test_from_json_str_invalid() {
        let result = LtrModelConfig::from_json_str(r#"{"feature_extractors": []}"#);
        assert!(matches!(result, Err(LtrError::Json(_))));
    }

    #[test]
    fn test_to_json_value() {
        let config = LtrModelConfig::new(vec![extractor("all")]);
        assert_eq!(
            config.to_json_value().unwrap(),
            json!({"learning_to_rank": {"feature_extractors": [
                {"query_extractor": {"feature_name": "all", "query": {"match_all": {}}, "default_score": 0.0}}
            ]}})
        );
    }

    #[test]
    fn test_from_file() {
        let config = LtrModelConfig::new(vec![extractor("x"), extractor("y")]);
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", config.to_json_value().unwrap()).unwrap();

        let loaded = LtrModelConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_missing_file() {
        let result = LtrModelConfig::from_file("/nonexistent/model.json");
        assert!(matches!(result, Err(LtrError::Anyhow(_))));
    }
}
