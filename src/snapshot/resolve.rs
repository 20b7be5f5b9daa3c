//! Option resolution: schema selection, validation, and the per-snapshot
//! config merge.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::merge::{merge_with, path_str, Merge};
use super::predicate::{Filter, Predicate};
use super::schema::{SchemaId, SchemaValidator, Violation};
use super::spec::{BuildInfo, SnapshotSpec};
use crate::config::Config;
use crate::discovery::hostname::{hostname_matches, hostname_of};
use crate::viewport::{normalize_widths, DEFAULT_MIN_HEIGHT, DEFAULT_WIDTHS};
use crate::{Result, ScoutError};

/// Port used for `serve` snapshots when none is configured.
pub const DEFAULT_SERVER_PORT: u16 = 5338;

/// Root keys that describe where snapshots come from rather than how they
/// are captured.
const SOURCE_KEYS: &[&str] = &["sitemap", "serve", "port", "baseUrl", "snapshots"];

/// A lazily produced snapshot list. Receives the resolved base URL.
pub type DeferredSnapshots =
    Box<dyn FnOnce(Option<String>) -> BoxFuture<'static, Result<Vec<Value>>> + Send>;

/// Extra options applied to the snapshots a filter matches.
#[derive(Debug, Clone)]
pub struct OptionRule {
    pub filter: Filter,
    pub options: Value,
}

impl OptionRule {
    pub fn new(filter: Filter, options: Value) -> Self {
        Self { filter, options }
    }

    /// Splits `{include, exclude, ...options}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        let filter = Filter::from_options(value);
        let options: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| *key != "include" && *key != "exclude")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self::new(filter, Value::Object(options)))
    }
}

/// Snapshot options as the user wrote them.
pub struct RawOptions {
    pub options: Value,
    pub filter: Filter,
    pub rules: Vec<OptionRule>,
    pub deferred: Option<DeferredSnapshots>,
}

impl fmt::Debug for RawOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawOptions")
            .field("options", &self.options)
            .field("filter", &self.filter)
            .field("rules", &self.rules)
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl RawOptions {
    /// Accepts a snapshot object, a bare URL, or a bare list of snapshots.
    /// `include`, `exclude`, and `options` are lifted out of an object.
    pub fn from_value(value: Value) -> Self {
        let mut options = match value {
            Value::Object(map) => map,
            Value::String(url) => {
                let mut map = Map::new();
                map.insert("url".into(), Value::String(url));
                map
            }
            Value::Array(snapshots) => {
                let mut map = Map::new();
                map.insert("snapshots".into(), Value::Array(snapshots));
                map
            }
            _ => Map::new(),
        };

        let include = options.remove("include");
        let exclude = options.remove("exclude");
        let filter = Filter::new(
            include.as_ref().and_then(Predicate::from_value),
            exclude.as_ref().and_then(Predicate::from_value),
        );
        let rules = match options.remove("options") {
            Some(Value::Array(items)) => items.iter().filter_map(OptionRule::from_value).collect(),
            Some(single @ Value::Object(_)) => OptionRule::from_value(&single).into_iter().collect(),
            _ => Vec::new(),
        };

        Self {
            options: Value::Object(options),
            filter,
            rules,
            deferred: None,
        }
    }

    pub fn with_include(mut self, include: impl Into<Predicate>) -> Self {
        self.filter.include = Some(include.into());
        self
    }

    pub fn with_exclude(mut self, exclude: impl Into<Predicate>) -> Self {
        self.filter.exclude = Some(exclude.into());
        self
    }

    pub fn with_rule(mut self, rule: OptionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_deferred<F, Fut>(mut self, producer: F) -> Self
    where
        F: FnOnce(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
    {
        self.deferred = Some(Box::new(move |base_url| producer(base_url).boxed()));
        self
    }
}

/// Where a resolved request gets its snapshots from.
pub enum SnapshotSource {
    /// The root options are themselves the one snapshot.
    Single(Value),
    Sitemap(String),
    List(Vec<Value>),
    Deferred(DeferredSnapshots),
}

impl fmt::Debug for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Single(v) => f.debug_tuple("Single").field(v).finish(),
            SnapshotSource::Sitemap(url) => f.debug_tuple("Sitemap").field(url).finish(),
            SnapshotSource::List(list) => f.debug_tuple("List").field(list).finish(),
            SnapshotSource::Deferred(_) => f.write_str("Deferred(<fn>)"),
        }
    }
}

#[derive(Debug)]
pub struct ResolvedOptions {
    pub schema: SchemaId,
    pub source: SnapshotSource,
    pub base_url: Option<String>,
    /// Capture options given once for every snapshot in a list.
    pub shared: Value,
    pub filter: Filter,
    pub rules: Vec<OptionRule>,
    pub violations: Vec<Violation>,
}

/// Pick the schema by the first marker key present.
pub fn select_schema(options: &Value, deferred: bool) -> SchemaId {
    let has = |key: &str| options.get(key).is_some_and(|v| !v.is_null());
    if has("domSnapshot") {
        SchemaId::Dom
    } else if has("url") {
        SchemaId::Snapshot
    } else if has("sitemap") {
        SchemaId::Sitemap
    } else if has("serve") {
        SchemaId::Server
    } else if has("snapshots") || deferred {
        SchemaId::List
    } else {
        SchemaId::Snapshot
    }
}

fn log_violations(violations: &[Violation], schema: SchemaId, prefix: &str) {
    for violation in violations {
        warn!(
            schema = %schema,
            path = %format!("{prefix}{}", violation.path),
            "Invalid snapshot option: {}",
            violation.message
        );
    }
}

fn has_url(entry: &Value) -> bool {
    match entry {
        Value::String(url) => !url.is_empty(),
        Value::Object(map) => map
            .get("url")
            .and_then(Value::as_str)
            .is_some_and(|url| !url.is_empty()),
        _ => false,
    }
}

/// Every concrete entry must carry a URL.
pub fn ensure_urls(entries: &[Value]) -> Result<()> {
    if entries.iter().all(has_url) {
        Ok(())
    } else {
        Err(ScoutError::MissingUrl)
    }
}

fn parse_base_url(raw: &str) -> Result<String> {
    Url::parse(raw)
        .map(|url| url.to_string())
        .map_err(|e| ScoutError::invalid_url(raw, e))
}

/// Validate raw options and work out where their snapshots come from.
///
/// Invalid fields are logged and dropped. Only a missing snapshot URL or a
/// malformed `baseUrl` is an error.
pub fn resolve(raw: RawOptions, validator: &dyn SchemaValidator) -> Result<ResolvedOptions> {
    let RawOptions {
        options,
        filter,
        mut rules,
        deferred,
    } = raw;

    let provisional = select_schema(&options, deferred.is_some());
    let mut options = validator.migrate(options, provisional);
    let schema = select_schema(&options, deferred.is_some());

    let violations = validator.validate(&mut options, schema);
    log_violations(&violations, schema, "");

    for (index, rule) in rules.iter_mut().enumerate() {
        let migrated = validator.migrate(std::mem::take(&mut rule.options), SchemaId::Snapshot);
        rule.options = migrated;
        let rule_violations = validator.validate(&mut rule.options, SchemaId::Snapshot);
        log_violations(&rule_violations, SchemaId::Snapshot, &format!("options.{index}."));
    }

    let Value::Object(mut map) = options else {
        return Err(ScoutError::MissingUrl);
    };

    let base_url = match (map.get("baseUrl").and_then(Value::as_str), schema) {
        (Some(base), _) => Some(parse_base_url(base)?),
        (None, SchemaId::Server) => {
            let port = map
                .get("port")
                .and_then(Value::as_u64)
                .unwrap_or(u64::from(DEFAULT_SERVER_PORT));
            Some(parse_base_url(&format!("http://localhost:{port}"))?)
        }
        (None, _) => None,
    };

    if deferred.is_some() && !matches!(schema, SchemaId::List | SchemaId::Server) {
        warn!(schema = %schema, "Ignoring deferred snapshots for a single-snapshot request");
    }

    let source = match schema {
        SchemaId::Snapshot | SchemaId::Dom => {
            let root = Value::Object(map.clone());
            ensure_urls(std::slice::from_ref(&root))?;
            SnapshotSource::Single(root)
        }
        SchemaId::Sitemap => match map.get("sitemap").and_then(Value::as_str) {
            Some(url) => SnapshotSource::Sitemap(url.to_string()),
            None => return Err(ScoutError::MissingUrl),
        },
        SchemaId::Server | SchemaId::List => match deferred {
            Some(producer) => SnapshotSource::Deferred(producer),
            None => {
                let entries = match map.get("snapshots") {
                    Some(Value::Array(entries)) => entries.clone(),
                    _ => Vec::new(),
                };
                ensure_urls(&entries)?;
                SnapshotSource::List(entries)
            }
        },
    };

    let shared = match schema {
        SchemaId::Snapshot | SchemaId::Dom => Value::Object(Map::new()),
        _ => {
            map.retain(|key, _| !SOURCE_KEYS.contains(&key.as_str()));
            Value::Object(map)
        }
    };

    debug!(schema = %schema, violations = violations.len(), "Resolved snapshot options");

    Ok(ResolvedOptions {
        schema,
        source,
        base_url,
        shared,
        filter,
        rules,
        violations,
    })
}

/// `path?query#fragment` of a URL.
pub fn default_name(url: &Url) -> String {
    let mut name = url.path().to_string();
    if let Some(query) = url.query() {
        name.push('?');
        name.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        name.push('#');
        name.push_str(fragment);
    }
    name
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn merge_widths(next: &Value) -> Merge {
    let widths: Vec<u32> = match next {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|w| u32::try_from(w).ok())
            .collect(),
        _ => Vec::new(),
    };
    let widths = normalize_widths(&widths);
    if widths.is_empty() {
        Merge::Skip
    } else {
        Merge::Set(json!(widths))
    }
}

fn merge_percy_css(prev: Option<&Value>, next: &Value) -> Merge {
    let Some(next) = next.as_str() else {
        return Merge::Skip;
    };
    let prev = prev.and_then(Value::as_str).unwrap_or("");
    let joined: Vec<&str> = [prev, next].into_iter().filter(|s| !s.is_empty()).collect();
    Merge::Set(Value::String(joined.join("\n")))
}

fn name_additional_snapshot(next: &Value, parent_name: &str) -> Merge {
    let Value::Object(map) = next else {
        return Merge::Structural;
    };
    let mut overlay = map.clone();
    let prefix = overlay.remove("prefix");
    let suffix = overlay.remove("suffix");
    if !overlay.get("name").is_some_and(Value::is_string) {
        let prefix = prefix.as_ref().and_then(Value::as_str).unwrap_or("");
        let suffix = suffix.as_ref().and_then(Value::as_str).unwrap_or("");
        overlay.insert(
            "name".into(),
            Value::String(format!("{prefix}{parent_name}{suffix}")),
        );
    }
    Merge::Set(Value::Object(overlay))
}

/// Merge defaults, global config, list-wide options, and the snapshot's own
/// options into a typed spec.
///
/// `snapshot` must already carry an absolute `url` and a `name`.
pub fn snapshot_config(
    config: &Config,
    build: Option<&BuildInfo>,
    shared: &Value,
    snapshot: &Value,
) -> Result<SnapshotSpec> {
    let url = snapshot
        .get("url")
        .and_then(Value::as_str)
        .ok_or(ScoutError::MissingUrl)?;
    let parsed = Url::parse(url).map_err(|e| ScoutError::invalid_url(url, e))?;
    let name = snapshot
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default_name(&parsed));
    let hostname = hostname_of(url).unwrap_or_default();

    let computed = json!({
        "name": name,
        "widths": DEFAULT_WIDTHS,
        "minHeight": DEFAULT_MIN_HEIGHT,
        "discovery": { "allowedHostnames": [hostname] },
        "meta": { "snapshot": { "name": name }, "build": build },
    });
    let sources = [
        computed,
        config.snapshot_defaults(),
        config.discovery_defaults(),
        shared.clone(),
        snapshot.clone(),
    ];

    let merged = merge_with(&sources, |path, prev, next| {
        match path_str(path).as_str() {
            "widths" => return merge_widths(next),
            "percyCSS" => return merge_percy_css(prev, next),
            "execute" if !next.is_object() => {
                return Merge::Redirect(vec!["execute".into(), "beforeSnapshot".into()])
            }
            "discovery.allowedHostnames" => {
                let mut hosts = string_list(prev);
                for host in string_list(Some(next)) {
                    if !hosts.contains(&host) {
                        hosts.push(host);
                    }
                }
                return Merge::Set(json!(hosts));
            }
            "discovery.disallowedHostnames" => {
                let hosts: Vec<String> = string_list(prev)
                    .into_iter()
                    .chain(string_list(Some(next)))
                    .filter(|host| !hostname_matches(std::slice::from_ref(host), url))
                    .collect();
                return Merge::Set(json!(hosts));
            }
            _ => {}
        }
        if path.len() == 2 && path[0] == "additionalSnapshots" {
            return name_additional_snapshot(next, &name);
        }
        Merge::Structural
    });

    let mut spec: SnapshotSpec = serde_json::from_value(merged)?;
    spec.meta.snapshot.name = spec.name.clone();
    Ok(spec)
}
