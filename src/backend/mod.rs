//! Search backends the feature logger can run against.
//!
//! A backend executes a [`SearchRequest`] against a named document collection.
//! [`InMemoryBackend`] is a self-contained implementation with BM25 and script
//! scoring; `HttpBackend` (feature `http`) talks to an Elasticsearch-compatible
//! `_search` endpoint.

pub mod analysis;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod request;
pub mod script;

use std::sync::Arc;

use crate::error::Result;

#[cfg(feature = "http")]
pub use self::http::{HttpBackend, HttpBackendConfig};
pub use self::memory::{InMemoryBackend, ScoringConfig};
pub use self::request::{SearchHit, SearchRequest, SearchResponse};

/// A read-only search endpoint.
///
/// Failures are reported as [`LtrError::Backend`](crate::error::LtrError::Backend).
pub trait SearchBackend: Send + Sync {
    /// Execute `request` against the collection named `index`.
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse>;

    /// Short name used in log messages.
    fn name(&self) -> &str {
        "search-backend"
    }
}

impl<T: SearchBackend + ?Sized> SearchBackend for &T {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(index, request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: SearchBackend + ?Sized> SearchBackend for Box<T> {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(index, request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(index, request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
