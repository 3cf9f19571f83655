//! Query parameter vocabulary and validation.
//!
//! Every accepted parameter is a variant of [`Param`], which carries its
//! evaluation priority and value shape. Raw input arrives as one or more
//! [`RawParams`] sources (URL query string, JSON body); each source is
//! validated independently by [`normalize`] and the results are merged by
//! set union per key.
//!
//! # Parameters
//!
//! | Name | Shape | Normalization |
//! |------|-------|---------------|
//! | `subject`, `code`, `units` | one or more strings | uppercased, deduplicated |
//! | `isLab`, `reverseOrder` | presence flag | value ignored |
//! | `keywords` | single string | kept verbatim |
//! | `sortBy` | single string | lowercased, must name a course property |
//! | `skip`, `limit` | single non-negative integer | parsed |
//! | `excludes` | string(s) | lowercased, split into property names |
//!
//! `format` is not a query parameter; it is stripped before validation and
//! consumed by the format negotiator.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{QueryError, QueryResult};
use crate::models::CourseProperty;

/// Keys removed from every source before validation.
pub const IGNORED_PARAMS: &[&str] = &["format"];

/// The closed set of query parameters, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    Subject,
    Code,
    Units,
    IsLab,
    Keywords,
    SortBy,
    ReverseOrder,
    Skip,
    Limit,
    Excludes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Prefixes,
    Flag,
    Single,
    Tokens,
}

impl Param {
    pub const ALL: [Param; 10] = [
        Param::Subject,
        Param::Code,
        Param::Units,
        Param::IsLab,
        Param::Keywords,
        Param::SortBy,
        Param::ReverseOrder,
        Param::Skip,
        Param::Limit,
        Param::Excludes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::Subject => "subject",
            Param::Code => "code",
            Param::Units => "units",
            Param::IsLab => "isLab",
            Param::Keywords => "keywords",
            Param::SortBy => "sortBy",
            Param::ReverseOrder => "reverseOrder",
            Param::Skip => "skip",
            Param::Limit => "limit",
            Param::Excludes => "excludes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Evaluation priority; lower runs first.
    ///
    /// `skip`/`limit` run after all filtering and sorting so pagination
    /// sees the final order, and `excludes` runs last because it strips the
    /// properties every other step inspects.
    pub fn priority(self) -> u32 {
        match self {
            Param::Subject => 0,
            Param::Code => 1,
            Param::Units => 2,
            Param::IsLab => 3,
            Param::Keywords => 4,
            Param::SortBy => 5,
            Param::ReverseOrder => 6,
            Param::Skip => 7,
            Param::Limit => 8,
            Param::Excludes => 9,
        }
    }

    /// The course property a prefix parameter filters on.
    pub fn property(self) -> Option<CourseProperty> {
        match self {
            Param::Subject => Some(CourseProperty::Subject),
            Param::Code => Some(CourseProperty::Code),
            Param::Units => Some(CourseProperty::Units),
            _ => None,
        }
    }

    fn shape(self) -> ValueShape {
        match self {
            Param::Subject | Param::Code | Param::Units => ValueShape::Prefixes,
            Param::IsLab | Param::ReverseOrder => ValueShape::Flag,
            Param::Keywords | Param::SortBy | Param::Skip | Param::Limit => ValueShape::Single,
            Param::Excludes => ValueShape::Tokens,
        }
    }
}

/// A validated, normalized parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Uppercased prefixes, OR-ed together.
    Prefixes(Vec<String>),
    Flag,
    Keywords(String),
    Count(usize),
    SortBy(CourseProperty),
    /// Lowercased property names; `*` means every property.
    Excludes(Vec<String>),
}

/// Unvalidated parameters from a single source.
///
/// Repeated keys accumulate their values in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    entries: Vec<(String, Vec<String>)>,
}

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    pub fn from_query_str(query: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.push(key.into_owned(), value.into_owned());
        }
        params
    }

    /// Converts a JSON object body into raw parameters.
    ///
    /// Values may be strings, numbers, booleans, or arrays of those; `null`
    /// values are dropped.
    pub fn from_json(body: &Value) -> QueryResult<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| QueryError::validation("request body must be a JSON object"))?;

        let mut params = Self::new();
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        params.push(key.clone(), json_scalar(key, item)?);
                    }
                }
                other => params.push(key.clone(), json_scalar(key, other)?),
            }
        }
        Ok(params)
    }

    /// The first `format` value, if any.
    pub fn format(&self) -> Option<&str> {
        self.get("format").and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_scalar(key: &str, value: &Value) -> QueryResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(QueryError::validation(format!(
            "parameter \"{}\" must be a string or a list of strings",
            key
        ))),
    }
}

/// Validated parameters keyed by [`Param`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedParams {
    values: BTreeMap<Param, ParamValue>,
}

impl ValidatedParams {
    pub fn get(&self, param: Param) -> Option<&ParamValue> {
        self.values.get(&param)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Present parameters sorted by ascending priority.
    pub fn by_priority(&self) -> Vec<(Param, &ParamValue)> {
        let mut entries: Vec<(Param, &ParamValue)> =
            self.values.iter().map(|(p, v)| (*p, v)).collect();
        entries.sort_by_key(|(p, _)| p.priority());
        entries
    }

    /// Merges `other` into `self` by set union per key.
    ///
    /// Single-valued parameters must agree; two different `limit` values
    /// from two sources are rejected rather than silently picking one.
    pub fn merge(mut self, other: ValidatedParams) -> QueryResult<Self> {
        for (param, incoming) in other.values {
            let merged = match (self.values.remove(&param), incoming) {
                (None, incoming) => incoming,
                (Some(ParamValue::Prefixes(a)), ParamValue::Prefixes(b)) => {
                    ParamValue::Prefixes(union(a, b))
                }
                (Some(ParamValue::Excludes(a)), ParamValue::Excludes(b)) => {
                    ParamValue::Excludes(union(a, b))
                }
                (Some(existing), incoming) if existing == incoming => existing,
                (Some(_), _) => {
                    return Err(QueryError::validation(format!(
                        "parameter \"{}\" has conflicting values",
                        param.name()
                    )))
                }
            };
            self.values.insert(param, merged);
        }
        Ok(self)
    }
}

fn union(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    for value in b {
        if !a.contains(&value) {
            a.push(value);
        }
    }
    a
}

fn dedup(values: impl IntoIterator<Item = String>) -> Vec<String> {
    union(Vec::new(), values.into_iter().collect())
}

/// Validates and normalizes a single parameter source.
pub fn normalize(raw: &RawParams) -> QueryResult<ValidatedParams> {
    let mut validated = ValidatedParams::default();

    for (key, values) in raw.iter() {
        if IGNORED_PARAMS.contains(&key) {
            continue;
        }
        let param = Param::from_name(key)
            .ok_or_else(|| QueryError::validation(format!("unknown parameter \"{}\"", key)))?;
        let value = normalize_value(param, values)?;
        validated.values.insert(param, value);
    }

    Ok(validated)
}

/// Normalizes every source independently, then merges them.
pub fn normalize_all(sources: &[RawParams]) -> QueryResult<ValidatedParams> {
    sources
        .iter()
        .try_fold(ValidatedParams::default(), |acc, raw| {
            acc.merge(normalize(raw)?)
        })
}

fn normalize_value(param: Param, values: &[String]) -> QueryResult<ParamValue> {
    match param.shape() {
        ValueShape::Flag => Ok(ParamValue::Flag),
        ValueShape::Prefixes => {
            if values.iter().any(|v| v.is_empty()) {
                return Err(QueryError::validation(format!(
                    "parameter \"{}\" must not be empty",
                    param.name()
                )));
            }
            Ok(ParamValue::Prefixes(dedup(
                values.iter().map(|v| v.to_uppercase()),
            )))
        }
        ValueShape::Tokens => {
            let tokens = values
                .iter()
                .flat_map(|v| exclude_tokens(v))
                .collect::<Vec<_>>();
            Ok(ParamValue::Excludes(dedup(tokens)))
        }
        ValueShape::Single => {
            let value = single_value(param, values)?;
            match param {
                Param::Keywords => Ok(ParamValue::Keywords(value.to_string())),
                Param::SortBy => {
                    let name = value.to_lowercase();
                    CourseProperty::from_name(&name)
                        .map(ParamValue::SortBy)
                        .ok_or_else(|| {
                            let allowed: Vec<&str> =
                                CourseProperty::ALL.iter().map(|p| p.name()).collect();
                            QueryError::validation(format!(
                                "parameter \"sortBy\" must be one of [{}], got \"{}\"",
                                allowed.join(", "),
                                value
                            ))
                        })
                }
                _ => parse_count(param, value).map(ParamValue::Count),
            }
        }
    }
}

/// Collapses identical duplicates and rejects anything else.
fn single_value(param: Param, values: &[String]) -> QueryResult<&str> {
    let first = values.first().ok_or_else(|| {
        QueryError::validation(format!("parameter \"{}\" requires a value", param.name()))
    })?;
    if values.iter().any(|v| v != first) {
        return Err(QueryError::validation(format!(
            "parameter \"{}\" must have a single value",
            param.name()
        )));
    }
    Ok(first)
}

fn parse_count(param: Param, value: &str) -> QueryResult<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        QueryError::validation(format!(
            "parameter \"{}\" must be a non-negative integer, got \"{}\"",
            param.name(),
            value
        ))
    })
}

fn exclude_tokens(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '*'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
