//! Learning-to-rank feature extraction.
//!
//! A [`LtrModelConfig`] is an ordered list of [`QueryFeatureExtractor`]s. A
//! [`FeatureLogger`] runs all of them against a set of documents with one
//! search request and returns a feature vector per document, in
//! configuration order.

pub mod config;
pub mod extractor;
pub mod logger;

pub use self::config::LtrModelConfig;
pub use self::extractor::QueryFeatureExtractor;
pub use self::logger::{DocumentFeatures, FeatureLogger};
