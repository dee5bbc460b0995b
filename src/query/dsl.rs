//! Typed representation of the search engine query DSL.
//!
//! [`QueryDsl`] models the query kinds the feature logger builds or that the
//! in-memory backend can evaluate. Everything else is carried verbatim as
//! [`QueryDsl::Raw`] so a remote engine can still validate and run it.
//!
//! The JSON shape follows the Elasticsearch query DSL:
//!
//! ```
//! use ltr_feature_logger::query::QueryDsl;
//! use serde_json::json;
//!
//! let query = QueryDsl::from_json(&json!({"match": {"title": "{{query}}"}})).unwrap();
//! assert_eq!(query.kind(), "match");
//! assert_eq!(query.to_json(), json!({"match": {"title": "{{query}}"}}));
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::{LtrError, Result};

/// A structured search query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDsl {
    /// Matches every document with a constant score.
    MatchAll { boost: Option<f64> },
    /// Analyzed full-text match on one field.
    Match(MatchQuery),
    /// Exact value match on one field.
    Term(TermQuery),
    /// Exact match against any of several values.
    Terms(TermsQuery),
    /// Restricts to a set of document ids.
    Ids(IdsQuery),
    /// Documents having a value for a field.
    Exists(ExistsQuery),
    /// Numeric or lexical range on one field.
    Range(RangeQuery),
    /// Boolean combination of clauses.
    Bool(BoolQuery),
    /// Replaces the score of an inner query with a script result.
    ScriptScore(ScriptScoreQuery),
    /// A query kind (or parameter set) not modeled here, passed through as-is.
    Raw(Value),
}

/// Operator joining the analyzed terms of a match query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub field: String,
    /// Scalar query text (string, number or boolean).
    pub query: Value,
    pub operator: Operator,
    pub boost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    pub field: String,
    pub value: Value,
    pub boost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermsQuery {
    pub field: String,
    pub values: Vec<Value>,
    pub boost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdsQuery {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsQuery {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeQuery {
    pub field: String,
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
    pub boost: Option<f64>,
}

/// Boolean query. Clauses in `must` and `should` contribute to the score,
/// `filter` and `must_not` only restrict.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    pub must: Vec<QueryDsl>,
    pub should: Vec<QueryDsl>,
    pub filter: Vec<QueryDsl>,
    pub must_not: Vec<QueryDsl>,
    pub minimum_should_match: Option<u32>,
    pub boost: Option<f64>,
    /// Query name reported back in `matched_queries`.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptScoreQuery {
    pub query: Box<QueryDsl>,
    pub script: Script,
    pub boost: Option<f64>,
}

/// Script source plus its parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub source: String,
    pub params: Map<String, Value>,
    pub lang: Option<String>,
}

impl Script {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Script {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_param<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("source".to_string(), Value::String(self.source.clone()));
        if !self.params.is_empty() {
            obj.insert("params".to_string(), Value::Object(self.params.clone()));
        }
        if let Some(lang) = &self.lang {
            obj.insert("lang".to_string(), Value::String(lang.clone()));
        }
        Value::Object(obj)
    }

    fn from_json(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::String(source) => Ok(Some(Script::new(source.clone()))),
            Value::Object(obj) => {
                if !only_keys(obj, &["source", "params", "lang"]) {
                    return Ok(None);
                }
                let source = obj
                    .get("source")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LtrError::query("[script] requires a string [source]"))?;
                let params = match obj.get("params") {
                    None => Map::new(),
                    Some(Value::Object(params)) => params.clone(),
                    Some(_) => return Err(LtrError::query("[script.params] must be an object")),
                };
                let lang = match obj.get("lang") {
                    None => None,
                    Some(Value::String(lang)) => Some(lang.clone()),
                    Some(_) => return Err(LtrError::query("[script.lang] must be a string")),
                };
                Ok(Some(Script {
                    source: source.to_string(),
                    params,
                    lang,
                }))
            }
            _ => Err(LtrError::query("[script] must be a string or an object")),
        }
    }
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: QueryDsl) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: QueryDsl) -> Self {
        self.should.push(query);
        self
    }

    pub fn filter(mut self, query: QueryDsl) -> Self {
        self.filter.push(query);
        self
    }

    pub fn must_not(mut self, query: QueryDsl) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn minimum_should_match(mut self, count: u32) -> Self {
        self.minimum_should_match = Some(count);
        self
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> QueryDsl {
        QueryDsl::Bool(self)
    }

    /// The effective minimum number of `should` clauses that must match.
    pub fn effective_minimum_should_match(&self) -> u32 {
        match self.minimum_should_match {
            Some(count) => count,
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }
}

impl QueryDsl {
    pub fn match_all() -> Self {
        QueryDsl::MatchAll { boost: None }
    }

    pub fn match_query<F: Into<String>, Q: Into<String>>(field: F, query: Q) -> Self {
        QueryDsl::Match(MatchQuery {
            field: field.into(),
            query: Value::String(query.into()),
            operator: Operator::Or,
            boost: None,
        })
    }

    pub fn term<F: Into<String>>(field: F, value: Value) -> Self {
        QueryDsl::Term(TermQuery {
            field: field.into(),
            value,
            boost: None,
        })
    }

    pub fn ids<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryDsl::Ids(IdsQuery {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn exists<F: Into<String>>(field: F) -> Self {
        QueryDsl::Exists(ExistsQuery {
            field: field.into(),
        })
    }

    pub fn script_score(query: QueryDsl, script: Script) -> Self {
        QueryDsl::ScriptScore(ScriptScoreQuery {
            query: Box::new(query),
            script,
            boost: None,
        })
    }

    /// The query kind, as it appears as the top-level key in the DSL.
    pub fn kind(&self) -> &str {
        match self {
            QueryDsl::MatchAll { .. } => "match_all",
            QueryDsl::Match(_) => "match",
            QueryDsl::Term(_) => "term",
            QueryDsl::Terms(_) => "terms",
            QueryDsl::Ids(_) => "ids",
            QueryDsl::Exists(_) => "exists",
            QueryDsl::Range(_) => "range",
            QueryDsl::Bool(_) => "bool",
            QueryDsl::ScriptScore(_) => "script_score",
            QueryDsl::Raw(value) => value
                .as_object()
                .and_then(|obj| obj.keys().next())
                .map(String::as_str)
                .unwrap_or("raw"),
        }
    }

    /// Serialize to the JSON query DSL.
    pub fn to_json(&self) -> Value {
        match self {
            QueryDsl::MatchAll { boost } => {
                let mut body = Map::new();
                insert_boost(&mut body, *boost);
                json!({ "match_all": body })
            }
            QueryDsl::Match(m) => {
                let inner = if m.operator == Operator::Or && m.boost.is_none() {
                    m.query.clone()
                } else {
                    let mut body = Map::new();
                    body.insert("query".to_string(), m.query.clone());
                    if m.operator == Operator::And {
                        body.insert("operator".to_string(), json!("and"));
                    }
                    insert_boost(&mut body, m.boost);
                    Value::Object(body)
                };
                json!({ "match": { m.field.clone(): inner } })
            }
            QueryDsl::Term(t) => {
                let inner = match t.boost {
                    None => t.value.clone(),
                    Some(boost) => json!({ "value": t.value, "boost": boost }),
                };
                json!({ "term": { t.field.clone(): inner } })
            }
            QueryDsl::Terms(t) => {
                let mut body = Map::new();
                body.insert(t.field.clone(), Value::Array(t.values.clone()));
                insert_boost(&mut body, t.boost);
                json!({ "terms": body })
            }
            QueryDsl::Ids(ids) => json!({ "ids": { "values": ids.values } }),
            QueryDsl::Exists(e) => json!({ "exists": { "field": e.field } }),
            QueryDsl::Range(r) => {
                let mut body = Map::new();
                for (key, bound) in [("gt", &r.gt), ("gte", &r.gte), ("lt", &r.lt), ("lte", &r.lte)] {
                    if let Some(bound) = bound {
                        body.insert(key.to_string(), bound.clone());
                    }
                }
                insert_boost(&mut body, r.boost);
                json!({ "range": { r.field.clone(): body } })
            }
            QueryDsl::Bool(b) => {
                let mut body = Map::new();
                for (key, clauses) in [
                    ("must", &b.must),
                    ("should", &b.should),
                    ("filter", &b.filter),
                    ("must_not", &b.must_not),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.to_string(),
                            Value::Array(clauses.iter().map(QueryDsl::to_json).collect()),
                        );
                    }
                }
                if let Some(count) = b.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(count));
                }
                insert_boost(&mut body, b.boost);
                if let Some(name) = &b.name {
                    body.insert("_name".to_string(), Value::String(name.clone()));
                }
                json!({ "bool": body })
            }
            QueryDsl::ScriptScore(s) => {
                let mut body = Map::new();
                body.insert("query".to_string(), s.query.to_json());
                body.insert("script".to_string(), s.script.to_json());
                insert_boost(&mut body, s.boost);
                json!({ "script_score": body })
            }
            QueryDsl::Raw(value) => value.clone(),
        }
    }

    /// Parse a JSON query DSL document.
    ///
    /// The document must be an object with exactly one key naming the query
    /// kind. Known kinds that carry parameters this type does not model are
    /// kept as [`QueryDsl::Raw`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| LtrError::query(format!("query must be a JSON object, got {value}")))?;
        let mut entries = obj.iter();
        let (Some((kind, body)), None) = (entries.next(), entries.next()) else {
            return Err(LtrError::query(format!(
                "query must have exactly one top-level key, got {}",
                obj.len()
            )));
        };
        let parsed = match kind.as_str() {
            "match_all" => parse_match_all(body)?,
            "match" => parse_match(body)?,
            "term" => parse_term(body)?,
            "terms" => parse_terms(body)?,
            "ids" => parse_ids(body)?,
            "exists" => parse_exists(body)?,
            "range" => parse_range(body)?,
            "bool" => parse_bool(body)?,
            "script_score" => parse_script_score(body)?,
            _ => None,
        };
        Ok(parsed.unwrap_or_else(|| QueryDsl::Raw(value.clone())))
    }
}

impl Serialize for QueryDsl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryDsl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        QueryDsl::from_json(&value).map_err(D::Error::custom)
    }
}

impl From<BoolQuery> for QueryDsl {
    fn from(query: BoolQuery) -> Self {
        QueryDsl::Bool(query)
    }
}

fn insert_boost(body: &mut Map<String, Value>, boost: Option<f64>) {
    if let Some(boost) = boost {
        body.insert("boost".to_string(), json!(boost));
    }
}

fn only_keys(obj: &Map<String, Value>, allowed: &[&str]) -> bool {
    obj.keys().all(|key| allowed.contains(&key.as_str()))
}

fn body_object<'a>(kind: &str, body: &'a Value) -> Result<&'a Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| LtrError::query(format!("[{kind}] query body must be an object")))
}

fn parse_boost(kind: &str, obj: &Map<String, Value>) -> Result<Option<f64>> {
    match obj.get("boost") {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| LtrError::query(format!("[{kind}] boost must be a number"))),
    }
}

/// Splits a `{ "<field>": <params>, "boost": .. }` body into the single field
/// entry and the remaining top-level options.
fn single_field<'a>(
    kind: &str,
    obj: &'a Map<String, Value>,
    options: &[&str],
) -> Result<(&'a String, &'a Value)> {
    let mut fields = obj.iter().filter(|(key, _)| !options.contains(&key.as_str()));
    let field = fields
        .next()
        .ok_or_else(|| LtrError::query(format!("[{kind}] query requires a field")))?;
    if fields.next().is_some() {
        return Err(LtrError::query(format!(
            "[{kind}] query doesn't support multiple fields"
        )));
    }
    Ok(field)
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn parse_match_all(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("match_all", body)?;
    if !only_keys(obj, &["boost"]) {
        return Ok(None);
    }
    Ok(Some(QueryDsl::MatchAll {
        boost: parse_boost("match_all", obj)?,
    }))
}

fn parse_match(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("match", body)?;
    let (field, params) = single_field("match", obj, &[])?;
    let query = match params {
        scalar if is_scalar(scalar) => MatchQuery {
            field: field.clone(),
            query: scalar.clone(),
            operator: Operator::Or,
            boost: None,
        },
        Value::Object(params) => {
            if !only_keys(params, &["query", "operator", "boost"]) {
                return Ok(None);
            }
            let text = params
                .get("query")
                .filter(|v| is_scalar(v))
                .ok_or_else(|| LtrError::query(format!("[match] field [{field}] requires a [query]")))?;
            let operator = match params.get("operator").map(|v| v.as_str()) {
                None => Operator::Or,
                Some(Some(op)) if op.eq_ignore_ascii_case("or") => Operator::Or,
                Some(Some(op)) if op.eq_ignore_ascii_case("and") => Operator::And,
                Some(other) => {
                    return Err(LtrError::query(format!(
                        "[match] unknown operator {other:?}"
                    )));
                }
            };
            MatchQuery {
                field: field.clone(),
                query: text.clone(),
                operator,
                boost: parse_boost("match", params)?,
            }
        }
        _ => {
            return Err(LtrError::query(format!(
                "[match] field [{field}] must be a scalar or an object"
            )));
        }
    };
    Ok(Some(QueryDsl::Match(query)))
}

fn parse_term(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("term", body)?;
    let (field, params) = single_field("term", obj, &[])?;
    let query = match params {
        scalar if is_scalar(scalar) => TermQuery {
            field: field.clone(),
            value: scalar.clone(),
            boost: None,
        },
        Value::Object(params) => {
            if !only_keys(params, &["value", "boost"]) {
                return Ok(None);
            }
            let value = params
                .get("value")
                .filter(|v| is_scalar(v))
                .ok_or_else(|| LtrError::query(format!("[term] field [{field}] requires a [value]")))?;
            TermQuery {
                field: field.clone(),
                value: value.clone(),
                boost: parse_boost("term", params)?,
            }
        }
        _ => {
            return Err(LtrError::query(format!(
                "[term] field [{field}] must be a scalar or an object"
            )));
        }
    };
    Ok(Some(QueryDsl::Term(query)))
}

fn parse_terms(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("terms", body)?;
    let (field, values) = single_field("terms", obj, &["boost"])?;
    let values = match values {
        Value::Array(values) if values.iter().all(is_scalar) => values.clone(),
        // terms lookup and other forms are left to the backend
        Value::Object(_) => return Ok(None),
        _ => {
            return Err(LtrError::query(format!(
                "[terms] field [{field}] must be an array of values"
            )));
        }
    };
    Ok(Some(QueryDsl::Terms(TermsQuery {
        field: field.clone(),
        values,
        boost: parse_boost("terms", obj)?,
    })))
}

fn parse_ids(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("ids", body)?;
    if !only_keys(obj, &["values"]) {
        return Ok(None);
    }
    let values = obj
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| LtrError::query("[ids] requires a [values] array"))?;
    let values = values
        .iter()
        .map(|v| match v {
            Value::String(id) => Ok(id.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(LtrError::query(format!("[ids] invalid id {other}"))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(QueryDsl::Ids(IdsQuery { values })))
}

fn parse_exists(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("exists", body)?;
    if !only_keys(obj, &["field"]) {
        return Ok(None);
    }
    let field = obj
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| LtrError::query("[exists] requires a string [field]"))?;
    Ok(Some(QueryDsl::exists(field)))
}

fn parse_range(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("range", body)?;
    let (field, params) = single_field("range", obj, &[])?;
    let params = params
        .as_object()
        .ok_or_else(|| LtrError::query(format!("[range] field [{field}] must be an object")))?;
    if !only_keys(params, &["gt", "gte", "lt", "lte", "boost"]) {
        return Ok(None);
    }
    let bound = |key: &str| -> Result<Option<Value>> {
        match params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) if is_scalar(v) => Ok(Some(v.clone())),
            Some(_) => Err(LtrError::query(format!(
                "[range] [{key}] must be a scalar value"
            ))),
        }
    };
    Ok(Some(QueryDsl::Range(RangeQuery {
        field: field.clone(),
        gt: bound("gt")?,
        gte: bound("gte")?,
        lt: bound("lt")?,
        lte: bound("lte")?,
        boost: parse_boost("range", params)?,
    })))
}

fn parse_clauses(occur: &str, value: Option<&Value>) -> Result<Vec<QueryDsl>> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(clauses)) => clauses.iter().map(QueryDsl::from_json).collect(),
        Some(clause @ Value::Object(_)) => Ok(vec![QueryDsl::from_json(clause)?]),
        Some(_) => Err(LtrError::query(format!(
            "[bool] [{occur}] must be a query or an array of queries"
        ))),
    }
}

fn parse_bool(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("bool", body)?;
    if !only_keys(
        obj,
        &["must", "should", "filter", "must_not", "minimum_should_match", "boost", "_name"],
    ) {
        return Ok(None);
    }
    let minimum_should_match = match obj.get("minimum_should_match") {
        None => None,
        Some(Value::Number(n)) => match n.as_u64().and_then(|count| u32::try_from(count).ok()) {
            Some(count) => Some(count),
            None => return Ok(None),
        },
        Some(Value::String(s)) => match s.trim().parse::<u32>() {
            Ok(count) => Some(count),
            // percentages and combinations are evaluated by the backend
            Err(_) => return Ok(None),
        },
        Some(_) => return Err(LtrError::query("[bool] invalid [minimum_should_match]")),
    };
    let name = match obj.get("_name") {
        None => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) => return Err(LtrError::query("[bool] [_name] must be a string")),
    };
    Ok(Some(QueryDsl::Bool(BoolQuery {
        must: parse_clauses("must", obj.get("must"))?,
        should: parse_clauses("should", obj.get("should"))?,
        filter: parse_clauses("filter", obj.get("filter"))?,
        must_not: parse_clauses("must_not", obj.get("must_not"))?,
        minimum_should_match,
        boost: parse_boost("bool", obj)?,
        name,
    })))
}

fn parse_script_score(body: &Value) -> Result<Option<QueryDsl>> {
    let obj = body_object("script_score", body)?;
    if !only_keys(obj, &["query", "script", "boost"]) {
        return Ok(None);
    }
    let query = obj
        .get("query")
        .ok_or_else(|| LtrError::query("[script_score] requires a [query]"))?;
    let script = obj
        .get("script")
        .ok_or_else(|| LtrError::query("[script_score] requires a [script]"))?;
    let Some(script) = Script::from_json(script)? else {
        return Ok(None);
    };
    Ok(Some(QueryDsl::ScriptScore(ScriptScoreQuery {
        query: Box::new(QueryDsl::from_json(query)?),
        script,
        boost: parse_boost("script_score", obj)?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_short_form() {
        let query = QueryDsl::from_json(&json!({"match": {"title": "matrix"}})).unwrap();
        assert_eq!(query, QueryDsl::match_query("title", "matrix"));
    }

    #[test]
    fn test_parse_match_long_form() {
        let value = json!({"match": {"title": {"query": "the matrix", "operator": "AND", "boost": 2.0}}});
        let query = QueryDsl::from_json(&value).unwrap();
        match &query {
            QueryDsl::Match(m) => {
                assert_eq!(m.operator, Operator::And);
                assert_eq!(m.boost, Some(2.0));
            }
            other => panic!("unexpected query {other:?}"),
        }
        assert_eq!(
            query.to_json(),
            json!({"match": {"title": {"query": "the matrix", "operator": "and", "boost": 2.0}}})
        );
    }

    #[test]
    fn test_parse_script_score() {
        let value = json!({
            "script_score": {
                "query": {"exists": {"field": "popularity"}},
                "script": {"source": "return doc['popularity'].value"}
            }
        });
        let query = QueryDsl::from_json(&value).unwrap();
        match &query {
            QueryDsl::ScriptScore(s) => {
                assert_eq!(*s.query, QueryDsl::exists("popularity"));
                assert_eq!(s.script.source, "return doc['popularity'].value");
            }
            other => panic!("unexpected query {other:?}"),
        }
        assert_eq!(query.to_json(), value);
    }

    #[test]
    fn test_bool_single_clause_object() {
        let value = json!({"bool": {"must": {"match_all": {}}, "_name": "0"}});
        let query = QueryDsl::from_json(&value).unwrap();
        let expected = BoolQuery::new().must(QueryDsl::match_all()).named("0").build();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_unknown_kind_is_raw() {
        let value = json!({"rank_feature": {"field": "pagerank"}});
        let query = QueryDsl::from_json(&value).unwrap();
        assert_eq!(query, QueryDsl::Raw(value.clone()));
        assert_eq!(query.kind(), "rank_feature");
        assert_eq!(query.to_json(), value);
    }

    #[test]
    fn test_unmodeled_parameters_are_raw() {
        let value = json!({"match": {"title": {"query": "matrix", "fuzziness": "AUTO"}}});
        assert_eq!(QueryDsl::from_json(&value).unwrap(), QueryDsl::Raw(value));

        let value = json!({"bool": {"should": [], "minimum_should_match": "75%"}});
        assert_eq!(QueryDsl::from_json(&value).unwrap(), QueryDsl::Raw(value));
    }

    #[test]
    fn test_malformed_queries() {
        assert!(QueryDsl::from_json(&json!("match")).is_err());
        assert!(QueryDsl::from_json(&json!({})).is_err());
        assert!(QueryDsl::from_json(&json!({"match": {}, "term": {}})).is_err());
        assert!(QueryDsl::from_json(&json!({"match": "title"})).is_err());
        assert!(QueryDsl::from_json(&json!({"match": {"a": "x", "b": "y"}})).is_err());
        assert!(QueryDsl::from_json(&json!({"exists": {"field": 3}})).is_err());
        assert!(QueryDsl::from_json(&json!({"script_score": {"query": {"match_all": {}}}})).is_err());
    }

    #[test]
    fn test_effective_minimum_should_match() {
        let only_should = BoolQuery::new().should(QueryDsl::match_all());
        assert_eq!(only_should.effective_minimum_should_match(), 1);

        let with_filter = BoolQuery::new()
            .should(QueryDsl::match_all())
            .filter(QueryDsl::ids(["a"]));
        assert_eq!(with_filter.effective_minimum_should_match(), 0);

        let explicit = with_filter.minimum_should_match(2);
        assert_eq!(explicit.effective_minimum_should_match(), 2);
    }

    #[test]
    fn test_oversized_minimum_should_match_is_raw() {
        let doc = json!({"bool": {
            "should": [{"match_all": {}}],
            "minimum_should_match": 4_294_967_296u64
        }});
        assert_eq!(QueryDsl::from_json(&doc).unwrap(), QueryDsl::Raw(doc));

        let doc = json!({"bool": {"should": [{"match_all": {}}], "minimum_should_match": 2}});
        let QueryDsl::Bool(parsed) = QueryDsl::from_json(&doc).unwrap() else {
            panic!("Expected Bool query");
        };
        assert_eq!(parsed.minimum_should_match, Some(2));
    }

    #[test]
    fn test_serde_uses_dsl_shape() {
        let query = QueryDsl::ids(["tt0133093"]);
        let text = serde_json::to_string(&query).unwrap();
        assert_eq!(text, r#"{"ids":{"values":["tt0133093"]}}"#);
        let back: QueryDsl = serde_json::from_str(&text).unwrap();
        assert_eq!(back, query);
    }
}
