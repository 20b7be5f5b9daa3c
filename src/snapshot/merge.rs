//! Path-aware merging of JSON option layers.
//!
//! Sources are merged left to right into an empty object. For every key the
//! caller's rule decides what happens; [`Merge::Structural`] falls back to the
//! default behaviour: objects merge recursively, arrays and scalars from the
//! later source replace earlier ones, and `null` is ignored. Arrays are
//! rebuilt element by element so rules keyed on `list.<index>` still fire.

use serde_json::{Map, Value};

/// What the rule wants done with an incoming value.
#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    Structural,
    /// Store this value at the current path, replacing whatever was there.
    Set(Value),
    /// Merge the incoming value at a different path instead.
    Redirect(Vec<String>),
    Skip,
}

/// Dotted form of a path, used for logging and rule lookup.
pub fn path_str(path: &[String]) -> String {
    path.join(".")
}

pub fn merge_with<F>(sources: &[Value], rule: F) -> Value
where
    F: Fn(&[String], Option<&Value>, &Value) -> Merge,
{
    let mut root = Value::Object(Map::new());
    for source in sources {
        if let Value::Object(map) = source {
            for (key, value) in map {
                merge_value(&mut root, vec![key.clone()], value, &rule);
            }
        }
    }
    root
}

fn merge_value<F>(root: &mut Value, path: Vec<String>, next: &Value, rule: &F)
where
    F: Fn(&[String], Option<&Value>, &Value) -> Merge,
{
    if next.is_null() {
        return;
    }

    let prev = get_path(root, &path).cloned();
    match rule(&path, prev.as_ref(), next) {
        Merge::Skip => {}
        Merge::Set(value) => set_path(root, &path, value),
        Merge::Redirect(target) => merge_value(root, target, next, rule),
        Merge::Structural => match next {
            Value::Object(map) => {
                if !matches!(prev, Some(Value::Object(_))) {
                    set_path(root, &path, Value::Object(Map::new()));
                }
                for (key, value) in map {
                    let mut child = path.clone();
                    child.push(key.clone());
                    merge_value(root, child, value, rule);
                }
            }
            Value::Array(items) => {
                set_path(root, &path, Value::Array(Vec::new()));
                for (index, item) in items.iter().enumerate() {
                    let mut child = path.clone();
                    child.push(index.to_string());
                    merge_value(root, child, item, rule);
                }
            }
            scalar => set_path(root, &path, scalar.clone()),
        },
    }
}

fn get_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let next_is_index = path[depth + 1].parse::<usize>().is_ok();
        current = child_mut(current, segment, next_is_index);
    }
    *slot_mut(current, last) = value;
}

fn child_mut<'a>(current: &'a mut Value, segment: &str, index_child: bool) -> &'a mut Value {
    let slot = slot_mut(current, segment);
    let container_ok = match &*slot {
        Value::Object(_) => true,
        Value::Array(_) => index_child,
        _ => false,
    };
    if !container_ok {
        *slot = if index_child {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    slot
}

/// The slot for `segment` inside `current`, creating it (and converting
/// `current` into a container) when needed.
fn slot_mut<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match current {
        Value::Array(_) => segment.parse::<usize>().ok(),
        _ => None,
    };
    match (current, index) {
        (Value::Array(items), Some(index)) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        (current, _) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            match current {
                Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
                _ => unreachable!("converted to an object above"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structural(_: &[String], _: Option<&Value>, _: &Value) -> Merge {
        Merge::Structural
    }

    #[test]
    fn objects_merge_recursively() {
        let merged = merge_with(
            &[
                json!({ "discovery": { "allowedHostnames": ["a.com"], "disableCache": false } }),
                json!({ "discovery": { "disableCache": true } }),
            ],
            structural,
        );
        assert_eq!(
            merged,
            json!({ "discovery": { "allowedHostnames": ["a.com"], "disableCache": true } })
        );
    }

    #[test]
    fn later_arrays_replace_earlier_ones() {
        let merged = merge_with(&[json!({ "a": [1, 2, 3] }), json!({ "a": [4] })], structural);
        assert_eq!(merged, json!({ "a": [4] }));
    }

    #[test]
    fn null_is_ignored() {
        let merged = merge_with(&[json!({ "a": 1 }), json!({ "a": null })], structural);
        assert_eq!(merged, json!({ "a": 1 }));
    }

    #[test]
    fn skip_keeps_previous_value() {
        let merged = merge_with(&[json!({ "a": 1 }), json!({ "a": 2 })], |path, prev, _| {
            if path_str(path) == "a" && prev.is_some() {
                Merge::Skip
            } else {
                Merge::Structural
            }
        });
        assert_eq!(merged, json!({ "a": 1 }));
    }

    #[test]
    fn redirect_moves_value() {
        let merged = merge_with(&[json!({ "execute": "run()" })], |path, _, next| {
            if path_str(path) == "execute" && !next.is_object() {
                Merge::Redirect(vec!["execute".into(), "beforeSnapshot".into()])
            } else {
                Merge::Structural
            }
        });
        assert_eq!(merged, json!({ "execute": { "beforeSnapshot": "run()" } }));
    }

    #[test]
    fn rules_fire_for_array_elements() {
        let merged = merge_with(&[json!({ "list": [{ "x": 1 }, { "x": 2 }] })], |path, _, next| {
            if path.len() == 2 && path[0] == "list" {
                let mut item = next.clone();
                item["index"] = json!(path[1]);
                Merge::Set(item)
            } else {
                Merge::Structural
            }
        });
        assert_eq!(
            merged,
            json!({ "list": [{ "x": 1, "index": "0" }, { "x": 2, "index": "1" }] })
        );
    }

    #[test]
    fn set_creates_missing_parents() {
        let mut root = json!({});
        set_path(&mut root, &["a".into(), "b".into()], json!(true));
        assert_eq!(root, json!({ "a": { "b": true } }));
    }
}
