//! Migration and validation of raw snapshot options.
//!
//! Validation never fails. Invalid or unknown fields are removed from the
//! options in place and reported as [`Violation`]s so the caller can warn and
//! carry on with what is left.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The option shapes a snapshot request can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaId {
    #[serde(rename = "/snapshot")]
    Snapshot,
    #[serde(rename = "/snapshot/dom")]
    Dom,
    #[serde(rename = "/snapshot/sitemap")]
    Sitemap,
    #[serde(rename = "/snapshot/server")]
    Server,
    #[serde(rename = "/snapshot/list")]
    List,
}

impl SchemaId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaId::Snapshot => "/snapshot",
            SchemaId::Dom => "/snapshot/dom",
            SchemaId::Sitemap => "/snapshot/sitemap",
            SchemaId::Server => "/snapshot/server",
            SchemaId::List => "/snapshot/list",
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable validation problem at a dotted option path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub trait SchemaValidator: Send + Sync {
    /// Rewrite legacy option names into their current form.
    fn migrate(&self, options: Value, schema: SchemaId) -> Value;

    /// Remove invalid fields from `options`, returning what was removed.
    fn validate(&self, options: &mut Value, schema: SchemaId) -> Vec<Violation>;
}

/// The built-in option schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSchema;

const LEGACY_KEYS: &[(&str, &str)] = &[
    ("min_height", "minHeight"),
    ("percy_css", "percyCSS"),
    ("enable_javascript", "enableJavaScript"),
    ("enableJavascript", "enableJavaScript"),
    ("dom_snapshot", "domSnapshot"),
    ("additional_snapshots", "additionalSnapshots"),
    ("wait_for_timeout", "waitForTimeout"),
    ("wait_for_selector", "waitForSelector"),
    ("allowed_hostnames", "allowedHostnames"),
    ("disallowed_hostnames", "disallowedHostnames"),
    ("network_idle_timeout", "networkIdleTimeout"),
    ("request_headers", "requestHeaders"),
    ("disable_cache", "disableCache"),
    ("user_agent", "userAgent"),
    ("base_url", "baseUrl"),
    ("after_navigation", "afterNavigation"),
    ("before_resize", "beforeResize"),
    ("after_resize", "afterResize"),
    ("before_snapshot", "beforeSnapshot"),
];

fn migrate_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            let mut legacy = Vec::new();
            for (key, value) in map {
                // header names are user data
                let value = if key == "requestHeaders" || key == "request_headers" {
                    value
                } else {
                    migrate_keys(value)
                };
                match LEGACY_KEYS.iter().find(|(old, _)| *old == key) {
                    Some((_, new)) => legacy.push((new.to_string(), value)),
                    None => {
                        out.insert(key, value);
                    }
                }
            }
            // the current name wins when both are present
            for (key, value) in legacy {
                out.entry(key).or_insert(value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(migrate_keys).collect()),
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Bool,
    PositiveInt,
    NonNegativeInt,
    Port,
    Widths,
    StrList,
    StrMap,
    Authorization,
    DomSnapshot,
    Script,
    Execute,
    Discovery,
    AdditionalSnapshots,
    Snapshots,
}

const SNAPSHOT_FIELDS: &[(&str, Kind)] = &[
    ("name", Kind::Str),
    ("url", Kind::Str),
    ("domSnapshot", Kind::DomSnapshot),
    ("widths", Kind::Widths),
    ("minHeight", Kind::PositiveInt),
    ("enableJavaScript", Kind::Bool),
    ("percyCSS", Kind::Str),
    ("waitForTimeout", Kind::NonNegativeInt),
    ("waitForSelector", Kind::Str),
    ("discovery", Kind::Discovery),
    ("execute", Kind::Execute),
    ("additionalSnapshots", Kind::AdditionalSnapshots),
];

/// Snapshot fields that may be given once for a whole list.
const SHARED_FIELDS: &[&str] = &[
    "widths",
    "minHeight",
    "enableJavaScript",
    "percyCSS",
    "waitForTimeout",
    "waitForSelector",
    "discovery",
    "execute",
    "additionalSnapshots",
];

const DISCOVERY_FIELDS: &[(&str, Kind)] = &[
    ("allowedHostnames", Kind::StrList),
    ("disallowedHostnames", Kind::StrList),
    ("networkIdleTimeout", Kind::PositiveInt),
    ("requestHeaders", Kind::StrMap),
    ("authorization", Kind::Authorization),
    ("disableCache", Kind::Bool),
    ("userAgent", Kind::Str),
];

const ADDITIONAL_FIELDS: &[(&str, Kind)] = &[
    ("name", Kind::Str),
    ("prefix", Kind::Str),
    ("suffix", Kind::Str),
    ("waitForTimeout", Kind::NonNegativeInt),
    ("waitForSelector", Kind::Str),
    ("execute", Kind::Script),
];

const EXECUTE_FIELDS: &[(&str, Kind)] = &[
    ("afterNavigation", Kind::Script),
    ("beforeResize", Kind::Script),
    ("afterResize", Kind::Script),
    ("beforeSnapshot", Kind::Script),
];

fn root_kind(schema: SchemaId, key: &str) -> Option<Kind> {
    let snapshot_field = || {
        SNAPSHOT_FIELDS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
    };
    let shared_field = || {
        if SHARED_FIELDS.contains(&key) {
            snapshot_field()
        } else {
            None
        }
    };

    match schema {
        SchemaId::Snapshot => snapshot_field(),
        SchemaId::Dom if key == "additionalSnapshots" => None,
        SchemaId::Dom => snapshot_field(),
        SchemaId::Sitemap => match key {
            "sitemap" => Some(Kind::Str),
            _ => shared_field(),
        },
        SchemaId::Server => match key {
            "serve" | "baseUrl" => Some(Kind::Str),
            "port" => Some(Kind::Port),
            "snapshots" => Some(Kind::Snapshots),
            _ => shared_field(),
        },
        SchemaId::List => match key {
            "baseUrl" => Some(Kind::Str),
            "snapshots" => Some(Kind::Snapshots),
            _ => shared_field(),
        },
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn is_script(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => items.iter().all(Value::is_string),
        _ => false,
    }
}

/// Validate the fields of `map` against a field table, removing failures.
fn check_fields(
    map: &mut Map<String, Value>,
    path: &str,
    lookup: impl Fn(&str) -> Option<Kind>,
    violations: &mut Vec<Violation>,
) {
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let field_path = join(path, &key);
        let keep = match lookup(&key) {
            None => {
                violations.push(Violation::new(&field_path, "unknown property"));
                false
            }
            Some(kind) => match map.get_mut(&key) {
                // null means "unset" and is ignored downstream
                Some(Value::Null) | None => true,
                Some(value) => check_value(kind, value, &field_path, violations),
            },
        };
        if !keep {
            map.remove(&key);
        }
    }
}

fn table_lookup(table: &'static [(&'static str, Kind)]) -> impl Fn(&str) -> Option<Kind> {
    move |key| {
        table
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
    }
}

/// Returns false when the whole value must be removed.
fn check_value(kind: Kind, value: &mut Value, path: &str, violations: &mut Vec<Violation>) -> bool {
    let mut fail = |message: &str| {
        violations.push(Violation::new(path, message));
        false
    };

    match kind {
        Kind::Str => value.is_string() || fail("must be a string"),
        Kind::Bool => value.is_boolean() || fail("must be a boolean"),
        Kind::PositiveInt => {
            value.as_u64().is_some_and(|n| n > 0) || fail("must be a positive integer")
        }
        Kind::NonNegativeInt => value.is_u64() || fail("must be a non-negative integer"),
        Kind::Port => {
            value.as_u64().is_some_and(|n| (1..=65535).contains(&n))
                || fail("must be a port number between 1 and 65535")
        }
        Kind::Widths => match value {
            Value::Array(items) if items.iter().all(|w| w.as_u64().is_some_and(|n| n > 0)) => true,
            _ => fail("must be an array of positive integers"),
        },
        Kind::StrList => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => true,
            _ => fail("must be an array of strings"),
        },
        Kind::StrMap => match value {
            Value::Object(map) if map.values().all(Value::is_string) => true,
            _ => fail("must be an object of string values"),
        },
        Kind::Authorization => match value {
            Value::Object(map) => {
                if !map.get("username").is_some_and(Value::is_string) {
                    return fail("must have a string username");
                }
                if map.get("password").is_some_and(|p| !p.is_string() && !p.is_null()) {
                    return fail("password must be a string");
                }
                true
            }
            _ => fail("must be an object"),
        },
        Kind::DomSnapshot => value.is_string() || fail("must be a string of serialized markup"),
        Kind::Script => is_script(value) || fail("must be a script or a list of scripts"),
        Kind::Execute => match value {
            Value::Object(map) => {
                check_fields(map, path, table_lookup(EXECUTE_FIELDS), violations);
                true
            }
            other if is_script(other) => true,
            _ => fail("must be a script, a list of scripts, or an object of hooks"),
        },
        Kind::Discovery => match value {
            Value::Object(map) => {
                check_fields(map, path, table_lookup(DISCOVERY_FIELDS), violations);
                true
            }
            _ => fail("must be an object"),
        },
        Kind::AdditionalSnapshots => match value {
            Value::Array(items) => {
                retain_entries(items, path, violations, |entry, entry_path, violations| {
                    match entry {
                        Value::Object(map) => {
                            check_fields(map, entry_path, table_lookup(ADDITIONAL_FIELDS), violations);
                            true
                        }
                        _ => {
                            violations.push(Violation::new(entry_path, "must be an object"));
                            false
                        }
                    }
                });
                true
            }
            _ => fail("must be an array"),
        },
        Kind::Snapshots => match value {
            Value::Array(items) => {
                retain_entries(items, path, violations, |entry, entry_path, violations| {
                    match entry {
                        Value::String(_) => true,
                        Value::Object(map) => {
                            let schema = if map.contains_key("domSnapshot") {
                                SchemaId::Dom
                            } else {
                                SchemaId::Snapshot
                            };
                            check_fields(map, entry_path, |key| root_kind(schema, key), violations);
                            true
                        }
                        _ => {
                            violations.push(Violation::new(
                                entry_path,
                                "must be a url string or a snapshot object",
                            ));
                            false
                        }
                    }
                });
                true
            }
            _ => fail("must be an array"),
        },
    }
}

fn retain_entries(
    items: &mut Vec<Value>,
    path: &str,
    violations: &mut Vec<Violation>,
    mut check: impl FnMut(&mut Value, &str, &mut Vec<Violation>) -> bool,
) {
    let mut index = 0;
    items.retain_mut(|entry| {
        let keep = check(entry, &join(path, &index.to_string()), violations);
        index += 1;
        keep
    });
}

impl SchemaValidator for BuiltinSchema {
    fn migrate(&self, options: Value, _schema: SchemaId) -> Value {
        migrate_keys(options)
    }

    fn validate(&self, options: &mut Value, schema: SchemaId) -> Vec<Violation> {
        let mut violations = Vec::new();
        match options {
            Value::Object(map) => {
                check_fields(map, "", |key| root_kind(schema, key), &mut violations);
            }
            _ => violations.push(Violation::new("", "must be an object")),
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrate_renames_legacy_keys() {
        let migrated = BuiltinSchema.migrate(
            json!({
                "url": "https://a.com",
                "min_height": 800,
                "percy_css": "p{}",
                "discovery": { "network_idle_timeout": 200, "request_headers": { "x_token": "1" } },
                "additional_snapshots": [{ "wait_for_selector": "#x" }]
            }),
            SchemaId::Snapshot,
        );
        assert_eq!(
            migrated,
            json!({
                "url": "https://a.com",
                "minHeight": 800,
                "percyCSS": "p{}",
                "discovery": { "networkIdleTimeout": 200, "requestHeaders": { "x_token": "1" } },
                "additionalSnapshots": [{ "waitForSelector": "#x" }]
            })
        );
    }

    #[test]
    fn migrate_prefers_current_key() {
        let migrated =
            BuiltinSchema.migrate(json!({ "minHeight": 1, "min_height": 2 }), SchemaId::Snapshot);
        assert_eq!(migrated, json!({ "minHeight": 1 }));
    }

    #[test]
    fn invalid_fields_are_scrubbed() {
        let mut options = json!({
            "url": "https://a.com",
            "widths": "wide",
            "minHeight": 0,
            "discovery": { "disableCache": "yes", "allowedHostnames": ["cdn.a.com"] },
            "bogus": true
        });
        let violations = BuiltinSchema.validate(&mut options, SchemaId::Snapshot);

        let mut paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["bogus", "discovery.disableCache", "minHeight", "widths"]);
        assert_eq!(
            options,
            json!({ "url": "https://a.com", "discovery": { "allowedHostnames": ["cdn.a.com"] } })
        );
    }

    #[test]
    fn dom_schema_rejects_additional_snapshots() {
        let mut options = json!({
            "url": "https://a.com",
            "domSnapshot": "<html></html>",
            "additionalSnapshots": [{ "suffix": " (2)" }]
        });
        let violations = BuiltinSchema.validate(&mut options, SchemaId::Dom);
        assert_eq!(violations, vec![Violation::new("additionalSnapshots", "unknown property")]);
        assert!(options.get("additionalSnapshots").is_none());
    }

    #[test]
    fn list_entries_are_validated_individually() {
        let mut options = json!({
            "baseUrl": "https://a.com",
            "widths": [375],
            "snapshots": ["/a", 42, { "url": "/b", "minHeight": -1 }]
        });
        let violations = BuiltinSchema.validate(&mut options, SchemaId::List);
        assert_eq!(
            violations,
            vec![
                Violation::new("snapshots.1", "must be a url string or a snapshot object"),
                Violation::new("snapshots.2.minHeight", "must be a positive integer"),
            ]
        );
        assert_eq!(options["snapshots"], json!(["/a", { "url": "/b" }]));
    }

    #[test]
    fn list_schema_rejects_per_snapshot_keys_at_root() {
        let mut options = json!({ "sitemap": "https://a.com/sitemap.xml", "name": "x" });
        let violations = BuiltinSchema.validate(&mut options, SchemaId::Sitemap);
        assert_eq!(violations, vec![Violation::new("name", "unknown property")]);
    }

    #[test]
    fn execute_accepts_all_shapes() {
        for execute in [
            json!("run()"),
            json!(["a()", "b()"]),
            json!({ "afterNavigation": "a()", "beforeSnapshot": ["b()"] }),
        ] {
            let mut options = json!({ "url": "https://a.com", "execute": execute });
            assert!(BuiltinSchema.validate(&mut options, SchemaId::Snapshot).is_empty());
        }
    }
}
