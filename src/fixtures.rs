//! The fixtures table: the widgets to register at startup, and the
//! settings that fill in what a widget or model doesn't specify.

use std::{collections::HashSet, path::Path};

use anyhow::{Result, Context, anyhow};
use kstring::KString;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::io_util::my_read_to_string;


#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FixtureError {
    #[error("invalid widget tag name {0:?} (need [a-z][a-z0-9-]*)")]
    InvalidTag(String),
    #[error("widget has neither `tag` nor `name`")]
    MissingTag,
    #[error("widget {0:?} is listed more than once")]
    DuplicateTag(String),
    #[error("widget {tag:?}: model request without `model` name at position {position}")]
    EmptyModel { tag: String, position: usize },
    #[error("widget {tag:?}: `models_override` entries must be objects (position {position})")]
    OverrideNotAnObject { tag: String, position: usize },
}

/// Tag names as used for custom elements in pages.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut cs = tag.chars();
    match cs.next() {
        Some(c) if c.is_ascii_lowercase() => (),
        _ => return false,
    }
    cs.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}


// ------------------------------------------------------------------
// Settings

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_api_url: String,
    pub default_models_data_path: String,
    pub default_model_scope_key: String,
    pub default_template_data_path: String,
    #[serde(alias = "DOM_attach_point")]
    pub dom_attach_point: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_api_url: "/api/".into(),
            default_models_data_path: "data.models".into(),
            default_model_scope_key: "models".into(),
            default_template_data_path: "data.models.0.template".into(),
            dom_attach_point: "body".into(),
        }
    }
}


// ------------------------------------------------------------------
// Model requests

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: KString,
    pub scope_key: Option<KString>,
    pub filter: Option<KString>,
    pub sort: Option<KString>,
    /// Endpoint override
    pub url: Option<KString>,
    /// Override for `Settings::default_models_data_path`
    pub data_path: Option<KString>,
}

impl ModelRequest {
    pub fn new(model: &str) -> Self {
        ModelRequest {
            model: KString::from_ref(model),
            scope_key: None,
            filter: None,
            sort: None,
            url: None,
            data_path: None,
        }
    }

    pub fn with_scope_key(mut self, scope_key: &str) -> Self {
        self.scope_key = Some(KString::from_ref(scope_key));
        self
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(KString::from_ref(filter));
        self
    }

    /// The key under which the fetched value is put into the render
    /// context.
    pub fn scope_key(&self) -> &str {
        self.scope_key.as_deref().unwrap_or(&self.model)
    }

    /// The query parameters to send: `model`, then `filter` and
    /// `sort` if given.
    pub fn params(&self) -> Vec<(KString, KString)> {
        let mut params = vec![(KString::from_static("model"), self.model.clone())];
        if let Some(filter) = &self.filter {
            params.push((KString::from_static("filter"), filter.clone()));
        }
        if let Some(sort) = &self.sort {
            params.push((KString::from_static("sort"), sort.clone()));
        }
        params
    }
}


// ------------------------------------------------------------------
// Widgets

/// A pre-fetched value to put into the context before fetching
/// anything.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOverride {
    pub scope_key: KString,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDescriptor {
    pub tag: KString,
    /// In fetch order.
    pub models: Vec<ModelRequest>,
    /// Inline template; if given, no template is fetched.
    pub template: Option<String>,
    /// Endpoint override for the template fetch
    pub template_url: Option<KString>,
    /// Override for `Settings::default_template_data_path`
    pub template_data_path: Option<KString>,
    pub models_override: Vec<ModelOverride>,
}

impl WidgetDescriptor {
    pub fn new(tag: &str, models: Vec<ModelRequest>) -> Result<Self, FixtureError> {
        if ! is_valid_tag(tag) {
            return Err(FixtureError::InvalidTag(tag.into()))
        }
        Ok(WidgetDescriptor {
            tag: KString::from_ref(tag),
            models,
            template: None,
            template_url: None,
            template_data_path: None,
            models_override: Vec::new(),
        })
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.into());
        self
    }
}


// The file format. Field names follow the original fixtures file,
// which is why both `tag` and `name` are accepted.

#[derive(Deserialize)]
struct RawModelRequest {
    model: String,
    scope_key: Option<String>,
    filter: Option<String>,
    sort: Option<String>,
    url: Option<String>,
    data_path: Option<String>,
}

#[derive(Deserialize)]
struct RawWidget {
    tag: Option<String>,
    name: Option<String>,
    #[serde(default)]
    models: Vec<RawModelRequest>,
    template: Option<String>,
    template_url: Option<String>,
    template_data_path: Option<String>,
    #[serde(default)]
    models_override: Vec<Value>,
}

#[derive(Deserialize)]
struct RawFixtures {
    #[serde(default)]
    widgets: Vec<RawWidget>,
    #[serde(default)]
    settings: Settings,
}

fn opt_kstring(s: Option<String>) -> Option<KString> {
    s.map(KString::from_string)
}

fn model_override(
    tag: &str,
    position: usize,
    value: Value,
    settings: &Settings,
) -> Result<ModelOverride, FixtureError> {
    let mut map: Map<String, Value> = match value {
        Value::Object(map) => map,
        _ => return Err(FixtureError::OverrideNotAnObject {
            tag: tag.into(), position
        })
    };
    let scope_key = map.remove("scope_key");
    let model = map.remove("model");
    let key = match (scope_key, model) {
        (Some(Value::String(k)), _) => k,
        (_, Some(Value::String(m))) => m,
        _ => settings.default_model_scope_key.clone(),
    };
    Ok(ModelOverride {
        scope_key: KString::from_string(key),
        value: Value::Object(map),
    })
}

fn widget_from_raw(raw: RawWidget, settings: &Settings) -> Result<WidgetDescriptor, FixtureError> {
    let tag = raw.tag.or(raw.name).ok_or(FixtureError::MissingTag)?;
    let mut models = Vec::with_capacity(raw.models.len());
    for (position, m) in raw.models.into_iter().enumerate() {
        if m.model.is_empty() {
            return Err(FixtureError::EmptyModel { tag, position })
        }
        models.push(ModelRequest {
            model: KString::from_string(m.model),
            scope_key: opt_kstring(m.scope_key),
            filter: opt_kstring(m.filter),
            sort: opt_kstring(m.sort),
            url: opt_kstring(m.url),
            data_path: opt_kstring(m.data_path),
        });
    }
    let models_override: Vec<ModelOverride> = raw.models_override.into_iter().enumerate()
        .map(|(position, v)| model_override(&tag, position, v, settings))
        .collect::<Result<_, _>>()?;
    let mut widget = WidgetDescriptor::new(&tag, models)?;
    widget.template = raw.template;
    widget.template_url = opt_kstring(raw.template_url);
    widget.template_data_path = opt_kstring(raw.template_data_path);
    widget.models_override = models_override;
    Ok(widget)
}


#[derive(Debug, Clone, PartialEq)]
pub struct Fixtures {
    pub widgets: Vec<WidgetDescriptor>,
    pub settings: Settings,
}

impl Fixtures {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: RawFixtures = serde_json::from_str(s)?;
        let settings = raw.settings;
        let mut seen = HashSet::new();
        let mut widgets = Vec::with_capacity(raw.widgets.len());
        for rw in raw.widgets {
            let w = widget_from_raw(rw, &settings)?;
            if ! seen.insert(w.tag.clone()) {
                return Err(FixtureError::DuplicateTag(w.tag.to_string()).into())
            }
            widgets.push(w);
        }
        Ok(Fixtures { widgets, settings })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = my_read_to_string(&path)?;
        Self::from_json_str(&s).with_context(
            || anyhow!("reading fixtures from {:?}", path.as_ref()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn t_is_valid_tag() {
        assert!(is_valid_tag("sidebar"));
        assert!(is_valid_tag("nav-bar2"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("2col"));
        assert!(!is_valid_tag("Sidebar"));
        assert!(!is_valid_tag("side bar"));
        assert!(!is_valid_tag("-x"));
    }

    #[test]
    fn t_scope_key_defaults_to_model() {
        let m = ModelRequest::new("category");
        assert_eq!(m.scope_key(), "category");
        let m = m.with_scope_key("categories");
        assert_eq!(m.scope_key(), "categories");
    }

    #[test]
    fn t_params() {
        let m = ModelRequest::new("project").with_filter("name:x");
        let ps: Vec<(String, String)> = m.params().into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(ps, vec![("model".into(), "project".into()),
                            ("filter".into(), "name:x".into())]);
    }

    #[test]
    fn t_from_json_str() -> Result<()> {
        let f = Fixtures::from_json_str(r#"{
            "modules": [],
            "widgets": [
                { "name": "header" },
                { "name": "sidebar",
                  "models": [{"model": "category", "scope_key": "categories"}] },
                { "tag": "footer", "template": "<p>(c)</p>",
                  "models_override": [{"model": "owner", "name": "me"},
                                      {"scope_key": "year", "value": 2024},
                                      {"x": 1}] }
            ],
            "routes": [],
            "settings": { "default_api_url": "/v2/api/" }
        }"#)?;
        assert_eq!(f.settings.default_api_url, "/v2/api/");
        assert_eq!(f.settings.default_models_data_path, "data.models");
        assert_eq!(f.widgets.len(), 3);
        assert_eq!(f.widgets[0].tag.as_str(), "header");
        assert!(f.widgets[0].models.is_empty());
        assert_eq!(f.widgets[1].models[0].scope_key(), "categories");
        let footer = &f.widgets[2];
        assert_eq!(footer.template.as_deref(), Some("<p>(c)</p>"));
        assert_eq!(footer.models_override,
                   vec![ModelOverride { scope_key: "owner".into(),
                                        value: json!({"name": "me"}) },
                        ModelOverride { scope_key: "year".into(),
                                        value: json!({"value": 2024}) },
                        ModelOverride { scope_key: "models".into(),
                                        value: json!({"x": 1}) }]);
        Ok(())
    }

    #[test]
    fn t_from_json_str_errors() {
        let e = Fixtures::from_json_str(r#"{"widgets": [{"name": "a"}, {"tag": "a"}]}"#)
            .err().unwrap();
        assert_eq!(e.downcast_ref::<FixtureError>(),
                   Some(&FixtureError::DuplicateTag("a".into())));
        let e = Fixtures::from_json_str(r#"{"widgets": [{"name": "Nav"}]}"#)
            .err().unwrap();
        assert_eq!(e.to_string(),
                   "invalid widget tag name \"Nav\" (need [a-z][a-z0-9-]*)");
        let e = Fixtures::from_json_str(r#"{"widgets": [{}]}"#).err().unwrap();
        assert_eq!(e.downcast_ref::<FixtureError>(), Some(&FixtureError::MissingTag));
        let e = Fixtures::from_json_str(
            r#"{"widgets": [{"name": "a", "models": [{"model": ""}]}]}"#)
            .err().unwrap();
        assert_eq!(e.downcast_ref::<FixtureError>(),
                   Some(&FixtureError::EmptyModel { tag: "a".into(), position: 0 }));
    }
}
