//! Placeholder rendering for query templates.
//!
//! Templates are structured queries whose string leaves may contain
//! `{{ name }}` placeholders. Rendering walks the JSON tree and substitutes
//! typed [`ParamValue`]s into string leaves only, so a parameter value can never
//! change the shape of the query.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{LtrError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid")
});

static PARAM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("parameter name pattern is valid")
});

/// A typed template parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Parse a command-line style value: numbers and booleans are typed,
    /// anything else is a string.
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => ParamValue::Number(n),
            _ => ParamValue::String(text.to_string()),
        }
    }

    /// JSON form used when a placeholder is the whole string leaf.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Number(n) => number_to_json(*n),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(ParamValue::to_json).collect()),
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Text form used when a placeholder is spliced into a larger string.
/// List items are joined with a single space.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Number(n) => match number_to_json(*n) {
                Value::Number(num) => write!(f, "{num}"),
                _ => write!(f, "{n}"),
            },
            ParamValue::String(s) => f.write_str(s),
            ParamValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Named parameters substituted into query templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateParams {
    values: BTreeMap<String, ParamValue>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<K: Into<String>, V: Into<ParamValue>>(mut self, name: K, value: V) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<ParamValue>>(&mut self, name: K, value: V) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    /// Parse a `name=value` assignment.
    pub fn parse_assignment(assignment: &str) -> Result<(String, ParamValue)> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            LtrError::template(format!("expected name=value, got {assignment:?}"))
        })?;
        let name = name.trim();
        validate_name(name)?;
        Ok((name.to_string(), ParamValue::parse(value)))
    }

    /// Check that every parameter name is a valid identifier.
    pub fn validate(&self) -> Result<()> {
        self.values.keys().try_for_each(|name| validate_name(name))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for TemplateParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = TemplateParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

fn validate_name(name: &str) -> Result<()> {
    if PARAM_NAME.is_match(name) {
        Ok(())
    } else {
        Err(LtrError::template(format!("invalid parameter name {name:?}")))
    }
}

/// Collect the placeholder names referenced anywhere in `template`.
pub fn placeholders(template: &Value) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    collect_placeholders(template, &mut names)?;
    Ok(names)
}

fn collect_placeholders(value: &Value, names: &mut BTreeSet<String>) -> Result<()> {
    match value {
        Value::String(text) => {
            for captures in PLACEHOLDER.captures_iter(text) {
                let name = &captures[1];
                validate_name(name)?;
                names.insert(name.to_string());
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| collect_placeholders(item, names)),
        Value::Object(obj) => obj.values().try_for_each(|item| collect_placeholders(item, names)),
        _ => Ok(()),
    }
}

/// Render `template` with `params`.
///
/// All placeholders are checked before anything is substituted: an invalid
/// placeholder or a parameter missing from `params` fails the whole render.
/// Unused parameters are ignored.
pub fn render(template: &Value, params: &TemplateParams) -> Result<Value> {
    params.validate()?;
    let missing: Vec<String> = placeholders(template)?
        .into_iter()
        .filter(|name| params.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(LtrError::template(format!(
            "missing template parameters: {}",
            missing.join(", ")
        )));
    }
    Ok(substitute(template, params))
}

fn substitute(value: &Value, params: &TemplateParams) -> Value {
    match value {
        Value::String(text) => render_string(text, params),
        Value::Array(items) => Value::Array(items.iter().map(|item| substitute(item, params)).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(key, item)| (key.clone(), substitute(item, params)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn render_string(text: &str, params: &TemplateParams) -> Value {
    if let Some(captures) = PLACEHOLDER.captures(text) {
        let whole = captures.get(0).map(|m| m.as_str().len()) == Some(text.len());
        if whole {
            if let Some(value) = params.get(&captures[1]) {
                return value.to_json();
            }
        }
    } else {
        return Value::String(text.to_string());
    }
    let rendered = PLACEHOLDER.replace_all(text, |captures: &regex::Captures<'_>| {
        params
            .get(&captures[1])
            .map(|value| value.to_string())
            .unwrap_or_default()
    });
    Value::String(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render_whole_leaf_keeps_type() {
        let template = json!({"range": {"year": {"gte": "{{min_year}}"}}});
        let params = TemplateParams::new().with("min_year", 1999);
        let rendered = render(&template, &params).unwrap();
        assert_eq!(rendered, json!({"range": {"year": {"gte": 1999}}}));
    }

    #[test]
    fn test_render_splices_into_text() {
        let template = json!({"match": {"title": "the {{ query }} reloaded"}});
        let params = TemplateParams::new().with("query", "matrix");
        let rendered = render(&template, &params).unwrap();
        assert_eq!(rendered, json!({"match": {"title": "the matrix reloaded"}}));
    }

    #[test]
    fn test_values_are_not_reparsed() {
        let template = json!({"match": {"title": "{{query}}"}});
        let params = TemplateParams::new().with("query", r#"x"}}, "match_all": {"#);
        let rendered = render(&template, &params).unwrap();
        assert_eq!(
            rendered,
            json!({"match": {"title": r#"x"}}, "match_all": {"#}})
        );
    }

    #[test]
    fn test_missing_parameter_fails() {
        let template = json!({"match": {"title": "{{query}} {{other}}"}});
        let params = TemplateParams::new().with("query", "matrix");
        let err = render(&template, &params).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_invalid_placeholder_fails() {
        let template = json!({"match": {"title": "{{ not a name }}"}});
        assert!(render(&template, &TemplateParams::new()).is_err());
    }

    #[test]
    fn test_invalid_parameter_name_fails() {
        let params = TemplateParams::new().with("bad name", "x");
        assert!(render(&json!({"match_all": {}}), &params).is_err());
    }

    #[test]
    fn test_placeholders() {
        let template = json!({
            "bool": {
                "should": [
                    {"match": {"title": "{{query}}"}},
                    {"range": {"year": {"gte": "{{min}}", "lte": "{{ max }}"}}}
                ]
            }
        });
        let names: Vec<_> = placeholders(&template).unwrap().into_iter().collect();
        assert_eq!(names, vec!["max", "min", "query"]);
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            TemplateParams::parse_assignment("query=the matrix").unwrap(),
            ("query".to_string(), ParamValue::String("the matrix".to_string()))
        );
        assert_eq!(
            TemplateParams::parse_assignment("min=2.5").unwrap().1,
            ParamValue::Number(2.5)
        );
        assert_eq!(
            TemplateParams::parse_assignment("flag=true").unwrap().1,
            ParamValue::Bool(true)
        );
        assert!(TemplateParams::parse_assignment("novalue").is_err());
    }

    #[test]
    fn test_list_display() {
        let value = ParamValue::from(vec!["a", "b"]);
        assert_eq!(value.to_string(), "a b");
        assert_eq!(value.to_json(), json!(["a", "b"]));
        assert_eq!(ParamValue::Number(3.0).to_string(), "3");
    }
}
