//! The data a widget template is compiled against.

use itertools::Itertools;
use kstring::KString;
use serde_json::Value;

use crate::json_path::{path_segments, resolve};

/// Mapping from scope key to resolved value, for one rendering
/// instance. Keeps the order in which entries were first inserted.
/// An entry can hold no value, when the fetched path did not exist.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderContext {
    entries: Vec<(KString, Option<Value>)>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing an existing entry in
    /// place.
    pub fn insert(&mut self, key: &str, value: Option<Value>) {
        if let Some(i) = self.entries.iter().position(|(k, _)| k.as_str() == key) {
            self.entries[i].1 = value;
        } else {
            self.entries.push((KString::from_ref(key), value));
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.as_str() == key)
    }

    /// `None` if there's no entry, `Some(None)` if the entry holds
    /// no value.
    pub fn get(&self, key: &str) -> Option<Option<&Value>> {
        self.entries.iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_ref())
    }

    /// Resolve a dot-path whose first segment is a scope key.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path_segments(path);
        let key = segments.next()?;
        let value = self.get(key)??;
        resolve(value, &segments.join("."))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
