//! Elasticsearch-compatible HTTP backend.
//!
//! Requires the `http` feature (enabled by default).
//!
//! # Examples
//!
//! ```no_run
//! use ltr_feature_logger::backend::{HttpBackend, HttpBackendConfig};
//!
//! # fn example() -> ltr_feature_logger::error::Result<()> {
//! let backend = HttpBackend::new(HttpBackendConfig {
//!     url: "http://localhost:9200".to_string(),
//!     ..Default::default()
//! })?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use log::debug;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::backend::SearchBackend;
use crate::backend::request::{SearchRequest, SearchResponse};
use crate::error::{BackendError, LtrError, Result};

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    /// Base URL of the cluster.
    pub url: String,
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Encoded API key, sent as `Authorization: ApiKey <key>`. Takes
    /// precedence over basic auth.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        HttpBackendConfig {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Runs searches through the `_search` REST endpoint.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| LtrError::config(format!("invalid url {:?}: {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(LtrError::config(format!("url {:?} cannot be a base", config.url)));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LtrError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpBackend {
            client,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    /// URL of the `_search` endpoint for `index`.
    pub fn search_url(&self, index: &str, named_scores: bool) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LtrError::config("url cannot be a base"))?
            .pop_if_empty()
            .push(index)
            .push("_search");
        if named_scores {
            url.query_pairs_mut()
                .append_pair("include_named_queries_score", "true");
        }
        Ok(url)
    }
}

impl SearchBackend for HttpBackend {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let url = self.search_url(index, request.include_named_queries_score)?;
        debug!("POST {url}");

        let mut builder = self.client.post(url).json(request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("ApiKey {api_key}"));
        } else if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        let response = builder
            .send()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(SearchResponse::from_json_str(&body)?)
        } else {
            Err(classify_error(index, status, body).into())
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Map an error response onto a [`BackendError`].
pub fn classify_error(index: &str, status: u16, body: String) -> BackendError {
    match status {
        404 if body.contains("index_not_found_exception") => {
            BackendError::IndexNotFound(index.to_string())
        }
        400 if body.contains("script_exception") => BackendError::Script(body),
        400 => BackendError::MalformedQuery(body),
        _ => BackendError::Response { status, body },
    }
}
