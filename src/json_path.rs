//! Dot-path addressing into JSON values, e.g. `data.models.0.template`.

//! Descent is by object key, or by numeric index for arrays. Lists
//! of JSON-encoded strings (which is how the model API ships its
//! models) are parsed on the way down, so that paths can continue
//! into them.

use std::borrow::Cow;

use serde_json::Value;

/// The segments of a dot-path. The empty path has no segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Parse all elements of a list holding JSON in string form. Gives
/// back the original list unchanged if any element fails to parse
/// (elements that are objects or lists count as failures, scalars
/// pass through as themselves).
pub fn fix_json_list(list: &[Value]) -> Vec<Value> {
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        match item {
            Value::String(s) => match serde_json::from_str(s) {
                Ok(v) => out.push(v),
                Err(_) => return list.to_vec(),
            },
            Value::Array(_) | Value::Object(_) => return list.to_vec(),
            scalar => out.push(scalar.clone()),
        }
    }
    out
}

/// Plain decimal only: no sign, no leading zeros.
fn array_index(segment: &str) -> Option<usize> {
    let canonical = segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || ! segment.starts_with('0'));
    if canonical { segment.parse().ok() } else { None }
}

fn descend<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(array_index(segment)?),
        _ => None,
    }
}

// Lists get normalized, hence a new value; anything else can stay
// borrowed.
fn normalize(value: &Value) -> Cow<Value> {
    match value {
        Value::Array(items) => Cow::Owned(Value::Array(fix_json_list(items))),
        v => Cow::Borrowed(v),
    }
}

/// The value at `path` in `value`, or `None` if any segment does not
/// exist. Lists selected on the way (including the result) are
/// normalized via `fix_json_list`.
pub fn resolve(value: &Value, path: &str) -> Option<Value> {
    let mut current = Cow::Borrowed(value);
    for segment in path_segments(path) {
        current = match current {
            Cow::Borrowed(v) => normalize(descend(v, segment)?),
            Cow::Owned(v) => Cow::Owned(normalize(descend(&v, segment)?).into_owned()),
        };
    }
    Some(current.into_owned())
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn t_resolve_existing() {
        let v = json!({"data": {"models": [{"template": "<b>x</b>"}], "code": 200}});
        assert_eq!(resolve(&v, "data.code"), Some(json!(200)));
        assert_eq!(resolve(&v, "data.models.0.template"), Some(json!("<b>x</b>")));
        assert_eq!(resolve(&v, ""), Some(v.clone()));
    }

    #[test]
    fn t_resolve_missing() {
        let v = json!({"data": {"models": [1, 2]}});
        assert_eq!(resolve(&v, "data.nope"), None);
        assert_eq!(resolve(&v, "data.models.2"), None);
        assert_eq!(resolve(&v, "data.models.x"), None);
        // can't descend into scalars
        assert_eq!(resolve(&v, "data.models.0.foo"), None);
        assert_eq!(resolve(&json!("abc"), "0"), None);
    }

    #[test]
    fn t_resolve_index_spelling() {
        let v = json!({"a": [10, 20]});
        assert_eq!(resolve(&v, "a.1"), Some(json!(20)));
        assert_eq!(resolve(&v, "a.0"), Some(json!(10)));
        assert_eq!(resolve(&v, "a.+1"), None);
        assert_eq!(resolve(&v, "a.01"), None);
        assert_eq!(resolve(&v, "a.00"), None);
        assert_eq!(resolve(&v, "a.-0"), None);
    }

    #[test]
    fn t_resolve_parses_embedded_json() {
        let v = json!({"data": {"models": [
            "{\"name\": \"sidebar\", \"template\": \"<ul></ul>\"}",
            "{\"name\": \"header\"}"
        ]}});
        assert_eq!(resolve(&v, "data.models"),
                   Some(json!([{"name": "sidebar", "template": "<ul></ul>"},
                               {"name": "header"}])));
        assert_eq!(resolve(&v, "data.models.0.template"), Some(json!("<ul></ul>")));
        assert_eq!(resolve(&v, "data.models.1.template"), None);
    }

    #[test]
    fn t_fix_json_list() {
        assert_eq!(fix_json_list(&[json!("{\"a\": 1}"), json!("[2]"), json!("3")]),
                   vec![json!({"a": 1}), json!([2]), json!(3)]);
        assert_eq!(fix_json_list(&[json!(1), json!(null), json!("true")]),
                   vec![json!(1), json!(null), json!(true)]);
        assert_eq!(fix_json_list(&[]), Vec::<Value>::new());
    }

    #[test]
    fn t_fix_json_list_malformed_keeps_list() {
        let list = [json!("{\"a\": 1}"), json!("Fiction")];
        assert_eq!(fix_json_list(&list), list.to_vec());
        let list = [json!({"id": 1, "name": "Fiction"})];
        assert_eq!(fix_json_list(&list), list.to_vec());
        let v = json!({"models": ["<ul>{{categories}}</ul>"]});
        assert_eq!(resolve(&v, "models.0"), Some(json!("<ul>{{categories}}</ul>")));
    }
}
