//! Query based feature extractors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LtrError, Result};
use crate::query::QueryDsl;
use crate::query::template::{self, TemplateParams};

/// A named feature computed as the score of a query template.
///
/// The query may contain `{{name}}` placeholders that are filled in from the
/// request parameters when features are extracted. Documents that do not
/// match the query get `default_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExtractorDocument", into = "ExtractorDocument")]
pub struct QueryFeatureExtractor {
    feature_name: String,
    query: QueryDsl,
    default_score: f64,
}

impl QueryFeatureExtractor {
    /// Create an extractor. The feature name must not be blank.
    pub fn new<S: Into<String>>(feature_name: S, query: QueryDsl) -> Result<Self> {
        let feature_name = feature_name.into();
        if feature_name.trim().is_empty() {
            return Err(LtrError::invalid_argument("feature_name must not be empty"));
        }
        Ok(QueryFeatureExtractor {
            feature_name,
            query,
            default_score: 0.0,
        })
    }

    /// Create an extractor from an Elasticsearch query DSL document.
    pub fn from_json<S: Into<String>>(feature_name: S, query: &Value) -> Result<Self> {
        let query = QueryDsl::from_json(query)?;
        Self::new(feature_name, query)
    }

    /// Set the score used for documents that do not match.
    pub fn with_default_score(mut self, default_score: f64) -> Result<Self> {
        if !default_score.is_finite() {
            return Err(LtrError::invalid_argument(format!(
                "default_score must be finite, got {default_score}"
            )));
        }
        self.default_score = default_score;
        Ok(self)
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    pub fn query(&self) -> &QueryDsl {
        &self.query
    }

    pub fn default_score(&self) -> f64 {
        self.default_score
    }

    /// Names of the template parameters the query refers to.
    pub fn placeholders(&self) -> Result<BTreeSet<String>> {
        template::placeholders(&self.query.to_json())
    }

    /// Render the query template with `params`.
    ///
    /// A rendered document that no longer parses as a known query kind is
    /// passed on untouched so that the backend reports the problem.
    pub fn render(&self, params: &TemplateParams) -> Result<QueryDsl> {
        let rendered = template::render(&self.query.to_json(), params)?;
        Ok(QueryDsl::from_json(&rendered).unwrap_or(QueryDsl::Raw(rendered)))
    }
}

#[derive(Serialize, Deserialize)]
enum ExtractorDocument {
    #[serde(rename = "query_extractor")]
    Query(QueryExtractorBody),
}

#[derive(Serialize, Deserialize)]
struct QueryExtractorBody {
    feature_name: String,
    query: QueryDsl,
    #[serde(default)]
    default_score: f64,
}

impl TryFrom<ExtractorDocument> for QueryFeatureExtractor {
    type Error = LtrError;

    fn try_from(document: ExtractorDocument) -> Result<Self> {
        let ExtractorDocument::Query(body) = document;
        QueryFeatureExtractor::new(body.feature_name, body.query)?.with_default_score(body.default_score)
    }
}

impl From<QueryFeatureExtractor> for ExtractorDocument {
    fn from(extractor: QueryFeatureExtractor) -> Self {
        ExtractorDocument::Query(QueryExtractorBody {
            feature_name: extractor.feature_name,
            query: extractor.query,
            default_score: extractor.default_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new() {
        let extractor =
            QueryFeatureExtractor::new("title_bm25", QueryDsl::match_query("title", "{{query}}"))
                .unwrap();
        assert_eq!(extractor.feature_name(), "title_bm25");
        assert_eq!(extractor.default_score(), 0.0);
        assert_eq!(extractor.query().kind(), "match");
    }

    #[test]
    fn test_empty_feature_name() {
        let result = QueryFeatureExtractor::new("  ", QueryDsl::match_all());
        assert!(matches!(result, Err(LtrError::InvalidArgument(_))));
    }

    #[test]
    fn test_default_score() {
        let extractor = QueryFeatureExtractor::new("f", QueryDsl::match_all())
            .unwrap()
            .with_default_score(-1.5)
            .unwrap();
        assert_eq!(extractor.default_score(), -1.5);

        let result = QueryFeatureExtractor::new("f", QueryDsl::match_all())
            .unwrap()
            .with_default_score(f64::NAN);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json() {
        let extractor =
            QueryFeatureExtractor::from_json("title", &json!({"match": {"title": "{{query}}"}}))
                .unwrap();
        assert_eq!(extractor.query().kind(), "match");

        let result = QueryFeatureExtractor::from_json("title", &json!("not a query"));
        assert!(matches!(result, Err(LtrError::Query(_))));
    }

    #[test]
    fn test_placeholders() {
        let extractor = QueryFeatureExtractor::from_json(
            "f",
            &json!({"bool": {
                "must": [{"match": {"title": "{{query}}"}}],
                "filter": [{"range": {"year": {"gte": "{{min_year}}"}}}]
            }}),
        )
        .unwrap();
        let names: Vec<String> = extractor.placeholders().unwrap().into_iter().collect();
        assert_eq!(names, vec!["min_year", "query"]);
    }

    #[test]
    fn test_render() {
        let extractor =
            QueryFeatureExtractor::from_json("f", &json!({"match": {"title": "{{query}}"}}))
                .unwrap();
        let params = TemplateParams::new().with("query", "matrix");
        assert_eq!(
            extractor.render(&params).unwrap(),
            QueryDsl::match_query("title", "matrix")
        );

        let result = extractor.render(&TemplateParams::new());
        assert!(matches!(result, Err(LtrError::Template(_))));
    }

    #[test]
    fn test_serde_shape() {
        let extractor = QueryFeatureExtractor::new("f", QueryDsl::match_query("title", "{{q}}"))
            .unwrap()
            .with_default_score(0.5)
            .unwrap();
        let value = serde_json::to_value(&extractor).unwrap();
        assert_eq!(
            value,
            json!({"query_extractor": {
                "feature_name": "f",
                "query": {"match": {"title": "{{q}}"}},
                "default_score": 0.5
            }})
        );

        let parsed: QueryFeatureExtractor = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, extractor);
    }

    #[test]
    fn test_deserialize_rejects_empty_name() {
        let value = json!({"query_extractor": {"feature_name": "", "query": {"match_all": {}}}});
        assert!(serde_json::from_value::<QueryFeatureExtractor>(value).is_err());
    }
}
