//! In-memory search backend.
//!
//! Holds named indices of JSON documents and evaluates [`QueryDsl`] against
//! them with Lucene-compatible BM25 scoring. It exists so feature extraction
//! can run without an external engine (tests, benchmarks, offline logging).
//!
//! ```
//! use ltr_feature_logger::backend::{InMemoryBackend, SearchBackend, SearchRequest};
//! use ltr_feature_logger::query::QueryDsl;
//! use serde_json::json;
//!
//! let backend = InMemoryBackend::new();
//! backend.index_document("movies", "tt0133093", json!({"title": "The Matrix"})).unwrap();
//!
//! let request = SearchRequest::new(QueryDsl::match_query("title", "matrix"));
//! let response = backend.search("movies", &request).unwrap();
//! assert_eq!(response.hits[0].id, "tt0133093");
//! ```

use std::collections::BTreeMap;
use std::io::BufRead;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::analysis::StandardAnalyzer;
use crate::backend::request::{SearchHit, SearchRequest, SearchResponse};
use crate::backend::script::{CompiledScript, ScriptContext, field_values, lookup};
use crate::backend::SearchBackend;
use crate::error::{BackendError, LtrError, Result};
use crate::query::{BoolQuery, MatchQuery, Operator, QueryDsl, RangeQuery};

/// BM25 parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Term frequency saturation.
    pub k1: f64,
    /// Field length normalization.
    pub b: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig { k1: 1.2, b: 0.75 }
    }
}

/// Analyzed terms of one text field of one document.
#[derive(Debug, Clone, Default)]
struct FieldTerms {
    length: usize,
    frequencies: AHashMap<String, u32>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    source: Map<String, Value>,
    fields: AHashMap<String, FieldTerms>,
}

/// Per-field collection statistics.
#[derive(Debug, Clone, Default)]
struct FieldStats {
    /// Documents with at least one term in the field.
    doc_count: usize,
    total_length: usize,
    doc_frequencies: AHashMap<String, usize>,
}

impl FieldStats {
    fn average_length(&self) -> f64 {
        if self.doc_count == 0 {
            1.0
        } else {
            self.total_length as f64 / self.doc_count as f64
        }
    }

    fn add(&mut self, terms: &FieldTerms) {
        self.doc_count += 1;
        self.total_length += terms.length;
        for term in terms.frequencies.keys() {
            *self.doc_frequencies.entry(term.clone()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Default)]
struct MemoryIndex {
    documents: Vec<StoredDocument>,
    positions: AHashMap<String, usize>,
    stats: AHashMap<String, FieldStats>,
}

impl MemoryIndex {
    fn upsert(&mut self, document: StoredDocument) {
        match self.positions.get(&document.id) {
            Some(&position) => {
                self.documents[position] = document;
                self.rebuild_stats();
            }
            None => {
                for (field, terms) in &document.fields {
                    self.stats.entry(field.clone()).or_default().add(terms);
                }
                self.positions.insert(document.id.clone(), self.documents.len());
                self.documents.push(document);
            }
        }
    }

    fn rebuild_stats(&mut self) {
        self.stats.clear();
        for document in &self.documents {
            for (field, terms) in &document.fields {
                self.stats.entry(field.clone()).or_default().add(terms);
            }
        }
    }
}

/// A thread-safe, in-process [`SearchBackend`].
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    indices: RwLock<AHashMap<String, MemoryIndex>>,
    analyzer: StandardAnalyzer,
    config: ScoringConfig,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_config(ScoringConfig::default())
    }

    pub fn with_config(config: ScoringConfig) -> Self {
        InMemoryBackend {
            indices: RwLock::new(AHashMap::new()),
            analyzer: StandardAnalyzer::new(),
            config,
        }
    }

    /// Create an empty index. Existing indices are left untouched.
    pub fn create_index(&self, index: &str) {
        self.indices.write().entry(index.to_string()).or_default();
    }

    /// Drop an index, returning whether it existed.
    pub fn delete_index(&self, index: &str) -> bool {
        self.indices.write().remove(index).is_some()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of documents in `index`, or `None` if it does not exist.
    pub fn doc_count(&self, index: &str) -> Option<usize> {
        self.indices.read().get(index).map(|idx| idx.documents.len())
    }

    /// Add or replace a document. The index is created on first use.
    pub fn index_document<S: Into<String>>(&self, index: &str, id: S, source: Value) -> Result<()> {
        let Value::Object(source) = source else {
            return Err(LtrError::invalid_argument("document source must be a JSON object"));
        };
        let document = self.analyze_document(id.into(), source);
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .upsert(document);
        Ok(())
    }

    /// Load newline-delimited JSON documents, taking each id from `id_field`.
    /// Blank lines are skipped. Returns the number of documents indexed.
    pub fn load_jsonl<R: BufRead>(&self, index: &str, reader: R, id_field: &str) -> Result<usize> {
        let mut count = 0;
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let source: Value = serde_json::from_str(&line).map_err(|e| {
                LtrError::invalid_argument(format!("line {}: invalid JSON: {e}", line_num + 1))
            })?;
            let id = match source.as_object().and_then(|obj| lookup(obj, id_field)) {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(LtrError::invalid_argument(format!(
                        "line {}: missing id field [{id_field}]",
                        line_num + 1
                    )));
                }
            };
            self.index_document(index, id, source)?;
            count += 1;
        }
        debug!("loaded {count} documents into [{index}]");
        Ok(count)
    }

    fn analyze_document(&self, id: String, source: Map<String, Value>) -> StoredDocument {
        let mut fields: AHashMap<String, FieldTerms> = AHashMap::new();
        for (key, value) in &source {
            self.collect_text(key, value, &mut fields);
        }
        StoredDocument { id, source, fields }
    }

    fn collect_text(&self, path: &str, value: &Value, fields: &mut AHashMap<String, FieldTerms>) {
        match value {
            Value::String(text) => {
                let terms = self.analyzer.analyze(text);
                if terms.is_empty() {
                    return;
                }
                let entry = fields.entry(path.to_string()).or_default();
                entry.length += terms.len();
                for term in terms {
                    *entry.frequencies.entry(term).or_insert(0) += 1;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_text(path, item, fields);
                }
            }
            Value::Object(nested) => {
                for (key, item) in nested {
                    self.collect_text(&format!("{path}.{key}"), item, fields);
                }
            }
            _ => {}
        }
    }
}

impl SearchBackend for InMemoryBackend {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let indices = self.indices.read();
        let idx = indices
            .get(index)
            .ok_or_else(|| BackendError::IndexNotFound(index.to_string()))?;

        let evaluator = Evaluator {
            index: idx,
            analyzer: &self.analyzer,
            config: &self.config,
        };
        let compiled = evaluator.prepare(&request.query)?;

        let mut hits = Vec::new();
        for document in &idx.documents {
            let mut named = BTreeMap::new();
            if let Some(score) = evaluator.evaluate(&compiled, document, &mut named)? {
                if !request.include_named_queries_score {
                    named.values_mut().for_each(|v| *v = 1.0);
                }
                hits.push(SearchHit {
                    id: document.id.clone(),
                    score: Some(score),
                    matched_queries: named,
                });
            }
        }

        let total = hits.len() as u64;
        // stable: ties keep insertion order
        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(request.size);
        debug!("[{index}] {} query matched {total} documents", request.query.kind());
        Ok(SearchResponse { total, hits })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// A query with its scripts compiled once per search.
enum Prepared<'q> {
    Leaf(&'q QueryDsl),
    Match {
        query: &'q MatchQuery,
        terms: Vec<String>,
    },
    Bool {
        query: &'q BoolQuery,
        must: Vec<Prepared<'q>>,
        should: Vec<Prepared<'q>>,
        filter: Vec<Prepared<'q>>,
        must_not: Vec<Prepared<'q>>,
    },
    ScriptScore {
        inner: Box<Prepared<'q>>,
        script: CompiledScript,
        params: &'q Map<String, Value>,
        boost: f64,
    },
}

struct Evaluator<'a> {
    index: &'a MemoryIndex,
    analyzer: &'a StandardAnalyzer,
    config: &'a ScoringConfig,
}

impl<'a> Evaluator<'a> {
    fn prepare<'q>(&self, query: &'q QueryDsl) -> std::result::Result<Prepared<'q>, BackendError> {
        let prepare_all = |clauses: &'q [QueryDsl]| {
            clauses
                .iter()
                .map(|clause| self.prepare(clause))
                .collect::<std::result::Result<Vec<_>, _>>()
        };
        match query {
            QueryDsl::Bool(b) => Ok(Prepared::Bool {
                query: b,
                must: prepare_all(b.must.as_slice())?,
                should: prepare_all(b.should.as_slice())?,
                filter: prepare_all(b.filter.as_slice())?,
                must_not: prepare_all(b.must_not.as_slice())?,
            }),
            QueryDsl::ScriptScore(s) => {
                if let Some(lang) = s.script.lang.as_deref() {
                    if lang != "painless" && lang != "expression" {
                        return Err(BackendError::Script(format!(
                            "script_lang not supported [{lang}]"
                        )));
                    }
                }
                Ok(Prepared::ScriptScore {
                    inner: Box::new(self.prepare(&s.query)?),
                    script: CompiledScript::compile(&s.script.source)?,
                    params: &s.script.params,
                    boost: s.boost.unwrap_or(1.0),
                })
            }
            QueryDsl::Raw(_) => Err(BackendError::MalformedQuery(format!(
                "unknown query [{}]",
                query.kind()
            ))),
            QueryDsl::Match(m) if m.query.is_string() => Ok(Prepared::Match {
                query: m,
                terms: scalar_text(&m.query)
                    .map(|text| self.analyzer.analyze(&text))
                    .unwrap_or_default(),
            }),
            leaf => Ok(Prepared::Leaf(leaf)),
        }
    }

    /// Score `document`, or `None` when it does not match. Named queries that
    /// match are recorded in `named`.
    fn evaluate(
        &self,
        query: &Prepared<'_>,
        document: &StoredDocument,
        named: &mut BTreeMap<String, f64>,
    ) -> std::result::Result<Option<f64>, BackendError> {
        match query {
            Prepared::Leaf(leaf) => Ok(self.evaluate_leaf(leaf, document)),
            Prepared::Match { query, terms } => Ok(self.evaluate_match(query, terms, document)),
            Prepared::Bool {
                query,
                must,
                should,
                filter,
                must_not,
            } => {
                // names are only reported when the enclosing bool matches
                let mut local = BTreeMap::new();
                for clause in filter {
                    if self.evaluate(clause, document, &mut local)?.is_none() {
                        return Ok(None);
                    }
                }
                for clause in must_not {
                    if self.evaluate(clause, document, &mut BTreeMap::new())?.is_some() {
                        return Ok(None);
                    }
                }
                let mut score = 0.0;
                for clause in must {
                    match self.evaluate(clause, document, &mut local)? {
                        Some(s) => score += s,
                        None => return Ok(None),
                    }
                }
                let mut should_matches = 0;
                for clause in should {
                    if let Some(s) = self.evaluate(clause, document, &mut local)? {
                        should_matches += 1;
                        score += s;
                    }
                }
                if should_matches < query.effective_minimum_should_match() {
                    return Ok(None);
                }
                let score = score * query.boost.unwrap_or(1.0);
                named.extend(local);
                if let Some(name) = &query.name {
                    named.insert(name.clone(), score);
                }
                Ok(Some(score))
            }
            Prepared::ScriptScore {
                inner,
                script,
                params,
                boost,
            } => {
                let Some(inner_score) = self.evaluate(inner, document, named)? else {
                    return Ok(None);
                };
                let ctx = ScriptContext::new(inner_score, &document.source, params);
                Ok(Some(script.execute(&ctx)? * boost))
            }
        }
    }

    fn evaluate_leaf(&self, query: &QueryDsl, document: &StoredDocument) -> Option<f64> {
        match query {
            QueryDsl::MatchAll { boost } => Some(boost.unwrap_or(1.0)),
            QueryDsl::Match(m) => {
                // non-string queries match exact values
                field_values(&document.source, &m.field)
                    .into_iter()
                    .any(|v| scalar_eq(v, &m.query))
                    .then(|| m.boost.unwrap_or(1.0))
            }
            QueryDsl::Term(t) => {
                let boost = t.boost.unwrap_or(1.0);
                if field_values(&document.source, &t.field)
                    .into_iter()
                    .any(|v| scalar_eq(v, &t.value))
                {
                    return Some(boost);
                }
                let term = scalar_text(&t.value)?;
                self.bm25(&t.field, std::slice::from_ref(&term), document)
                    .map(|score| score * boost)
            }
            QueryDsl::Terms(t) => {
                let values = field_values(&document.source, &t.field);
                let hit = values
                    .iter()
                    .any(|v| t.values.iter().any(|expected| scalar_eq(v, expected)));
                hit.then(|| t.boost.unwrap_or(1.0))
            }
            QueryDsl::Ids(ids) => ids.values.iter().any(|id| *id == document.id).then_some(1.0),
            QueryDsl::Exists(e) => {
                (!field_values(&document.source, &e.field).is_empty()).then_some(1.0)
            }
            QueryDsl::Range(r) => {
                let values = field_values(&document.source, &r.field);
                values
                    .iter()
                    .any(|v| in_range(v, r))
                    .then(|| r.boost.unwrap_or(1.0))
            }
            // compound kinds are prepared separately
            QueryDsl::Bool(_) | QueryDsl::ScriptScore(_) | QueryDsl::Raw(_) => None,
        }
    }

    fn evaluate_match(&self, m: &MatchQuery, terms: &[String], document: &StoredDocument) -> Option<f64> {
        if terms.is_empty() {
            return None;
        }
        if m.operator == Operator::And {
            let field = document.fields.get(&m.field)?;
            if !terms.iter().all(|t| field.frequencies.contains_key(t)) {
                return None;
            }
        }
        self.bm25(&m.field, terms, document)
            .map(|score| score * m.boost.unwrap_or(1.0))
    }

    /// Sum of BM25 scores of `terms` in `field`, `None` if no term occurs.
    fn bm25(&self, field: &str, terms: &[String], document: &StoredDocument) -> Option<f64> {
        let doc_terms = document.fields.get(field)?;
        let stats = self.index.stats.get(field)?;
        let k1 = self.config.k1;
        let b = self.config.b;
        let doc_len = doc_terms.length as f64;
        let avg_len = stats.average_length();

        let mut matched = false;
        let mut score = 0.0;
        for term in terms {
            let Some(&tf) = doc_terms.frequencies.get(term) else {
                continue;
            };
            matched = true;
            let tf = tf as f64;
            let df = *stats.doc_frequencies.get(term).unwrap_or(&0) as f64;
            let n = stats.doc_count as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            score += idf * tf / (tf + k1 * (1.0 - b + b * doc_len / avg_len));
        }
        matched.then_some(score)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
        (Value::Number(a), Value::String(e)) | (Value::String(e), Value::Number(a)) => {
            e.parse::<f64>().ok() == a.as_f64()
        }
        (Value::String(a), Value::String(e)) => a == e,
        (Value::Bool(a), Value::Bool(e)) => a == e,
        (Value::Bool(a), Value::String(e)) => e.as_str() == if *a { "true" } else { "false" },
        _ => false,
    }
}

fn in_range(value: &Value, range: &RangeQuery) -> bool {
    use std::cmp::Ordering;

    let compare = |bound: &Value| -> Option<Ordering> {
        match (value, bound) {
            (Value::Number(v), Value::Number(b)) => v.as_f64()?.partial_cmp(&b.as_f64()?),
            (Value::Number(v), Value::String(b)) => v.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
            (Value::String(v), Value::String(b)) => Some(v.as_str().cmp(b.as_str())),
            _ => None,
        }
    };
    let check = |bound: &Option<Value>, accept: fn(Ordering) -> bool| match bound {
        None => true,
        Some(bound) => compare(bound).is_some_and(accept),
    };
    check(&range.gt, |o| o == Ordering::Greater)
        && check(&range.gte, |o| o != Ordering::Less)
        && check(&range.lt, |o| o == Ordering::Less)
        && check(&range.lte, |o| o != Ordering::Greater)
}
