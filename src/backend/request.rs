//! Search request and response types exchanged with a backend.
//!
//! `SearchRequest` serializes to an Elasticsearch `_search` body and
//! `SearchResponse` deserializes from the Elasticsearch response shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::query::QueryDsl;

/// A search against one document collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: QueryDsl,
    pub size: usize,
    /// Whether hit sources should be returned.
    #[serde(rename = "_source")]
    pub source: bool,
    /// Ask the backend for per named query scores. Sent as a URL parameter,
    /// not in the body.
    #[serde(skip)]
    pub include_named_queries_score: bool,
}

impl SearchRequest {
    pub fn new(query: QueryDsl) -> Self {
        SearchRequest {
            query,
            size: 10,
            source: true,
            include_named_queries_score: false,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn without_source(mut self) -> Self {
        self.source = false;
        self
    }

    pub fn with_named_queries_score(mut self) -> Self {
        self.include_named_queries_score = true;
        self
    }
}

/// A single hit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f64>,
    /// Named queries matched by this document and their scores. When scores
    /// were not requested every matched name maps to `1.0`.
    pub matched_queries: BTreeMap<String, f64>,
}

/// Hits returned by a search.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "WireResponse")]
pub struct SearchResponse {
    /// Total number of matching documents.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    /// Decode an Elasticsearch `_search` response body.
    pub fn from_json_str(body: &str) -> Result<Self, BackendError> {
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct WireResponse {
    hits: WireHits,
}

#[derive(Deserialize)]
struct WireHits {
    #[serde(default)]
    total: Option<WireTotal>,
    #[serde(default)]
    hits: Vec<WireHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Deserialize)]
struct WireHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(default)]
    matched_queries: Option<WireMatchedQueries>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireMatchedQueries {
    Scored(BTreeMap<String, f64>),
    Names(Vec<String>),
}

impl From<WireResponse> for SearchResponse {
    fn from(wire: WireResponse) -> Self {
        let hits: Vec<SearchHit> = wire
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score,
                matched_queries: match hit.matched_queries {
                    None => BTreeMap::new(),
                    Some(WireMatchedQueries::Scored(scores)) => scores,
                    Some(WireMatchedQueries::Names(names)) => {
                        names.into_iter().map(|name| (name, 1.0)).collect()
                    }
                },
            })
            .collect();
        let total = match wire.hits.total {
            Some(WireTotal::Count(count)) | Some(WireTotal::Object { value: count }) => count,
            None => hits.len() as u64,
        };
        SearchResponse { total, hits }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_body() {
        let request = SearchRequest::new(QueryDsl::ids(["a", "b"]))
            .with_size(2)
            .without_source()
            .with_named_queries_score();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({"query": {"ids": {"values": ["a", "b"]}}, "size": 2, "_source": false})
        );
    }

    #[test]
    fn test_decode_scored_matched_queries() {
        let body = r#"{
            "took": 3,
            "timed_out": false,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "max_score": 7.5,
                "hits": [
                    {"_index": "movies", "_id": "tt0133093", "_score": 7.5,
                     "matched_queries": {"0": 6.2, "1": 1.3}},
                    {"_index": "movies", "_id": "tt0308090", "_score": 0.0}
                ]
            }
        }"#;
        let response = SearchResponse::from_json_str(body).unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].matched_queries.get("0"), Some(&6.2));
        assert_eq!(response.hits[0].matched_queries.get("1"), Some(&1.3));
        assert!(response.hits[1].matched_queries.is_empty());
    }

    #[test]
    fn test_decode_matched_query_names() {
        let body = r#"{"hits": {"total": 1, "hits": [
            {"_id": "a", "_score": null, "matched_queries": ["0"]}
        ]}}"#;
        let response = SearchResponse::from_json_str(body).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].score, None);
        assert_eq!(response.hits[0].matched_queries.get("0"), Some(&1.0));
    }

    #[test]
    fn test_decode_error() {
        let err = SearchResponse::from_json_str("{\"acknowledged\": true}").unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }
}
