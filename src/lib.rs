//! # ltr-feature-logger
//!
//! Learning-to-rank feature logging over a search engine's query API.
//!
//! ## Features
//!
//! - Named, query based feature extractors with `{{param}}` templates
//! - One search request per logging call, scored with named queries
//! - Model configurations in the Elasticsearch `learning_to_rank` shape
//! - An in-memory backend with BM25 and script scoring for tests and offline use
//! - An HTTP backend for Elasticsearch-compatible clusters (feature `http`)

pub mod backend;
pub mod cli;
pub mod error;
pub mod ltr;
pub mod query;

pub mod prelude {
    pub use crate::backend::{InMemoryBackend, SearchBackend, SearchRequest, SearchResponse};
    pub use crate::error::{BackendError, LtrError, Result};
    pub use crate::ltr::{DocumentFeatures, FeatureLogger, LtrModelConfig, QueryFeatureExtractor};
    pub use crate::query::{BoolQuery, QueryDsl, Script, TemplateParams};

    #[cfg(feature = "http")]
    pub use crate::backend::{HttpBackend, HttpBackendConfig};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
