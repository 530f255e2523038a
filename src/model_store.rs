//! The backend's data: named lists of model objects, queried by
//! model name, field filters and sort keys.

use std::{cmp::Ordering, collections::BTreeMap, path::Path};

use anyhow::{Result, Context, anyhow, bail};
use serde_json::{json, Map, Value};

use crate::io_util::my_read_to_string;


/// Errors as reported to API clients, with their HTTP status.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("GET - No model supplied in query parameters! (param: model)")]
    NoModel,
    #[error("GET - Model '{0}' not found")]
    UnknownModel(String),
    #[error("Field '{field}' not found for model: '{model}'")]
    UnknownField { field: String, model: String },
    #[error("Malformed filter '{0}' (need field:value)")]
    MalformedFilter(String),
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}

impl ApiError {
    pub fn code(&self) -> u16 {
        match self {
            ApiError::NoModel => 400,
            ApiError::UnknownModel(_) => 404,
            ApiError::UnknownField { .. } => 400,
            ApiError::MalformedFilter(_) => 400,
            ApiError::InvalidMethod(_) => 405,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "msg": self.to_string(), "code": self.code() })
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelQuery {
    pub model: String,
    /// All have to match.
    pub filter: Vec<(String, String)>,
    /// Most significant first.
    pub sort: Vec<SortKey>,
}

/// `f1:v1+f2:v2`. The value is everything after the first colon.
pub fn parse_query_pairs(s: &str) -> Result<Vec<(String, String)>, ApiError> {
    s.split('+')
        .filter(|p| ! p.is_empty())
        .map(|p| match p.split_once(':') {
            Some((f, v)) if ! f.is_empty() => Ok((f.to_string(), v.to_string())),
            _ => Err(ApiError::MalformedFilter(p.to_string())),
        })
        .collect()
}

/// `f1,-f2`: by f1 ascending, then f2 descending.
pub fn parse_sort_keys(s: &str) -> Vec<SortKey> {
    s.split(',')
        .map(str::trim)
        .filter(|k| ! k.is_empty())
        .map(|k| match k.strip_prefix('-') {
            Some(field) => SortKey { field: field.into(), descending: true },
            None => SortKey { field: k.into(), descending: false },
        })
        .collect()
}

impl ModelQuery {
    pub fn from_params(
        model: Option<&str>,
        filter: Option<&str>,
        sort: Option<&str>
    ) -> Result<Self, ApiError> {
        let model = match model {
            Some(m) if ! m.is_empty() => m.to_string(),
            _ => return Err(ApiError::NoModel),
        };
        Ok(ModelQuery {
            model,
            filter: filter.map(parse_query_pairs).transpose()?.unwrap_or_default(),
            sort: sort.map(parse_sort_keys).unwrap_or_default(),
        })
    }
}


/// What filter values are compared with.
fn field_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order for sorting; missing fields first.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                let (a, b) = (a.as_f64().unwrap_or(0.), b.as_f64().unwrap_or(0.));
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => type_rank(a).cmp(&type_rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        }
    }
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelStore {
    models: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl ModelStore {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        let top = match value {
            Value::Object(top) => top,
            _ => bail!("model store must be an object mapping model names to lists"),
        };
        let mut models = BTreeMap::new();
        for (name, list) in top {
            let list = match list {
                Value::Array(list) => list,
                _ => bail!("model {name:?}: expecting a list of objects"),
            };
            let mut objects = Vec::with_capacity(list.len());
            for (i, v) in list.into_iter().enumerate() {
                match v {
                    Value::Object(o) => objects.push(o),
                    _ => bail!("model {name:?}: entry {i} is not an object"),
                }
            }
            models.insert(name, objects);
        }
        Ok(ModelStore { models })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = my_read_to_string(&path)?;
        Self::from_json_str(&s).with_context(
            || anyhow!("reading model store from {:?}", path.as_ref()))
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|k| k.as_str())
    }

    fn check_field(&self, model: &str, entries: &[Map<String, Value>], field: &str)
                   -> Result<(), ApiError>
    {
        if entries.iter().any(|e| e.contains_key(field)) {
            Ok(())
        } else {
            Err(ApiError::UnknownField { field: field.into(), model: model.into() })
        }
    }

    /// The entries matching `query`, in the requested order (store
    /// order otherwise).
    pub fn query(&self, query: &ModelQuery) -> Result<Vec<&Map<String, Value>>, ApiError> {
        let entries = self.models.get(&query.model)
            .ok_or_else(|| ApiError::UnknownModel(query.model.clone()))?;
        for (field, _) in &query.filter {
            self.check_field(&query.model, entries, field)?;
        }
        for key in &query.sort {
            self.check_field(&query.model, entries, &key.field)?;
        }
        let mut found: Vec<&Map<String, Value>> = entries.iter()
            .filter(|e| query.filter.iter().all(
                |(field, value)| e.get(field).map(field_text).as_deref() == Some(value.as_str())))
            .collect();
        found.sort_by(|a, b| {
            query.sort.iter().fold(Ordering::Equal, |ord, key| {
                ord.then_with(|| {
                    let o = compare_fields(a.get(&key.field), b.get(&key.field));
                    if key.descending { o.reverse() } else { o }
                })
            })
        });
        Ok(found)
    }

    /// The response body and status for a GET, the way clients get
    /// to see them: models as JSON strings, 404 if none matched.
    pub fn get_response(&self, query: &ModelQuery) -> (u16, Value) {
        match self.query(query) {
            Ok(found) => {
                let code = if found.is_empty() { 404 } else { 200 };
                let models: Vec<Value> = found.into_iter()
                    .map(|m| Value::String(Value::Object(m.clone()).to_string()))
                    .collect();
                (code, json!({ "models": models, "code": code }))
            }
            Err(e) => (e.code(), e.to_json()),
        }
    }
}
