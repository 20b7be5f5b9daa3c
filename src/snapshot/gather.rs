use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::resolve::{
    default_name, ensure_urls, resolve, snapshot_config, OptionRule, RawOptions, ResolvedOptions,
    SnapshotSource,
};
use super::schema::{BuiltinSchema, SchemaId, SchemaValidator};
use super::spec::{BuildInfo, SnapshotSpec};
use crate::config::Config;
use crate::sitemap::{gather_sitemap_urls, HttpSitemapFetcher, SitemapFetcher};
use crate::{Result, ScoutError};

/// Everything gathering needs besides the raw options.
#[derive(Clone)]
pub struct GatherContext {
    pub config: Config,
    pub schema: Arc<dyn SchemaValidator>,
    pub sitemap: Arc<dyn SitemapFetcher>,
    pub build: Option<BuildInfo>,
}

impl GatherContext {
    /// Built-in schemas and an HTTP sitemap fetcher.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            schema: Arc::new(BuiltinSchema),
            sitemap: Arc::new(HttpSitemapFetcher::new()?),
            build: None,
        })
    }

    /// Like [`new`](Self::new) with a caller supplied sitemap fetcher.
    pub fn with_fetcher(config: Config, sitemap: Arc<dyn SitemapFetcher>) -> Self {
        Self {
            config,
            schema: Arc::new(BuiltinSchema),
            sitemap,
            build: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_build(mut self, build: BuildInfo) -> Self {
        self.build = Some(build);
        self
    }
}

/// Resolve raw options into the final list of snapshot specs.
///
/// Fails with [`ScoutError::NoSnapshots`] when filtering leaves nothing.
pub async fn gather(ctx: &GatherContext, raw: RawOptions) -> Result<Vec<SnapshotSpec>> {
    let ResolvedOptions {
        schema,
        source,
        base_url,
        shared,
        filter,
        rules,
        ..
    } = resolve(raw, ctx.schema.as_ref())?;

    let entries = match source {
        SnapshotSource::Single(root) => vec![root],
        SnapshotSource::Sitemap(url) => gather_sitemap_urls(ctx.sitemap.as_ref(), &url)
            .await?
            .into_iter()
            .map(Value::String)
            .collect(),
        SnapshotSource::List(entries) => entries,
        SnapshotSource::Deferred(producer) => {
            let produced = producer(base_url.clone()).await?;
            validate_deferred(ctx.schema.as_ref(), produced)?
        }
    };
    debug!(schema = %schema, entries = entries.len(), "Collected snapshot entries");

    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let snapshot = normalize_entry(entry, base_url.as_deref())?;
        if !filter.matches(&snapshot) {
            debug!(
                snapshot = snapshot["name"].as_str().unwrap_or_default(),
                "Skipping snapshot rejected by include/exclude"
            );
            continue;
        }
        let snapshot = apply_rules(snapshot, &rules);
        specs.push(snapshot_config(
            &ctx.config,
            ctx.build.as_ref(),
            &shared,
            &snapshot,
        )?);
    }

    if specs.is_empty() {
        return Err(ScoutError::NoSnapshots);
    }
    info!(count = specs.len(), "Gathered snapshots");
    Ok(specs)
}

/// Run a produced list through the list schema.
fn validate_deferred(validator: &dyn SchemaValidator, produced: Vec<Value>) -> Result<Vec<Value>> {
    let mut list = validator.migrate(json!({ "snapshots": produced }), SchemaId::List);
    for violation in validator.validate(&mut list, SchemaId::List) {
        warn!(
            schema = %SchemaId::List,
            path = %violation.path,
            "Invalid snapshot option: {}",
            violation.message
        );
    }
    let entries = match list.get_mut("snapshots").map(Value::take) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };
    ensure_urls(&entries)?;
    Ok(entries)
}

/// Turn an entry into an object with an absolute `url` and a `name`.
pub fn normalize_entry(entry: Value, base_url: Option<&str>) -> Result<Value> {
    let mut snapshot = match entry {
        Value::String(url) => {
            let mut map = Map::new();
            map.insert("url".into(), Value::String(url));
            map
        }
        Value::Object(map) => map,
        _ => return Err(ScoutError::MissingUrl),
    };

    let raw_url = snapshot
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or(ScoutError::MissingUrl)?
        .to_string();
    let url = resolve_url(&raw_url, base_url)?;

    if !snapshot.get("name").is_some_and(Value::is_string) {
        snapshot.insert("name".into(), Value::String(default_name(&url)));
    }
    snapshot.insert("url".into(), Value::String(url.to_string()));
    Ok(Value::Object(snapshot))
}

fn resolve_url(raw: &str, base_url: Option<&str>) -> Result<Url> {
    let joined = match base_url {
        Some(base) => Url::parse(base).and_then(|base| base.join(raw)),
        None => Url::parse(raw),
    };
    joined.map_err(|e| ScoutError::invalid_url(raw, e))
}

/// Shallow-assign the options of every matching rule, in declared order.
pub fn apply_rules(mut snapshot: Value, rules: &[OptionRule]) -> Value {
    for rule in rules {
        if !rule.filter.matches(&snapshot) {
            continue;
        }
        if let (Value::Object(target), Value::Object(options)) = (&mut snapshot, &rule.options) {
            for (key, value) in options {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sitemap::FetchedDocument;
    use crate::snapshot::predicate::Predicate;
    use async_trait::async_trait;

    struct NoSitemap;

    #[async_trait]
    impl SitemapFetcher for NoSitemap {
        async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
            Err(ScoutError::SitemapFetch {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    struct FixedSitemap(&'static str);

    #[async_trait]
    impl SitemapFetcher for FixedSitemap {
        async fn fetch(&self, _url: &str) -> Result<FetchedDocument> {
            Ok(FetchedDocument {
                status: 200,
                content_type: Some("text/xml".into()),
                body: self.0.to_string(),
            })
        }
    }

    fn ctx() -> GatherContext {
        GatherContext::with_fetcher(Config::default(), Arc::new(NoSitemap))
    }

    fn names(specs: &[SnapshotSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn bare_string_gets_path_name() {
        let specs = gather(&ctx(), RawOptions::from_value(json!("https://a.com/page")))
            .await
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "/page");
        assert_eq!(specs[0].url, "https://a.com/page");
    }

    #[tokio::test]
    async fn list_entries_resolve_against_base_url() {
        let raw = RawOptions::from_value(json!({
            "baseUrl": "https://a.com",
            "snapshots": ["/one", { "url": "/two#top", "minHeight": 500 }, "https://b.com/three?x=1"]
        }));
        let specs = gather(&ctx(), raw).await.unwrap();
        assert_eq!(names(&specs), vec!["/one", "/two#top", "/three?x=1"]);
        assert_eq!(specs[1].url, "https://a.com/two#top");
        assert_eq!(specs[1].min_height, 500);
        assert_eq!(specs[2].discovery.allowed_hostnames, vec!["b.com"]);
    }

    #[tokio::test]
    async fn filters_drop_snapshots() {
        let raw = RawOptions::from_value(json!({
            "baseUrl": "https://a.com",
            "snapshots": ["/blog/a", "/blog/b", "/about"],
            "exclude": "/blog/b"
        }))
        .with_include(Predicate::pattern("/blog/*"));
        let specs = gather(&ctx(), raw).await.unwrap();
        assert_eq!(names(&specs), vec!["/blog/a"]);
    }

    #[tokio::test]
    async fn everything_filtered_is_no_snapshots() {
        let raw = RawOptions::from_value(json!({
            "baseUrl": "https://a.com",
            "snapshots": ["/a"],
            "exclude": "/a"
        }));
        assert!(matches!(gather(&ctx(), raw).await, Err(ScoutError::NoSnapshots)));
    }

    #[tokio::test]
    async fn later_rules_take_precedence() {
        let raw = RawOptions::from_value(json!({
            "baseUrl": "https://a.com",
            "snapshots": ["/a", "/b"],
            "options": [
                { "include": "/a", "minHeight": 300 },
                { "minHeight": 400, "percyCSS": "p{}" },
                { "include": "/a", "minHeight": 500 }
            ]
        }));
        let specs = gather(&ctx(), raw).await.unwrap();
        assert_eq!(specs[0].min_height, 500);
        assert_eq!(specs[1].min_height, 400);
        assert_eq!(specs[1].percy_css.as_deref(), Some("p{}"));
    }

    #[tokio::test]
    async fn deferred_list_receives_base_url_and_is_validated() {
        let raw = RawOptions::from_value(json!({ "baseUrl": "https://a.com" })).with_deferred(
            |base| async move {
                assert_eq!(base.as_deref(), Some("https://a.com/"));
                Ok(vec![json!("/lazy"), json!({ "url": "/bad", "widths": "x" })])
            },
        );
        let specs = gather(&ctx(), raw).await.unwrap();
        assert_eq!(names(&specs), vec!["/lazy", "/bad"]);
        assert_eq!(specs[1].widths, vec![375, 1280]);
    }

    #[tokio::test]
    async fn deferred_entry_without_url_is_fatal() {
        let raw = RawOptions::from_value(json!({}))
            .with_deferred(|_| async { Ok(vec![json!({ "name": "nameless" })]) });
        assert!(matches!(gather(&ctx(), raw).await, Err(ScoutError::MissingUrl)));
    }

    #[tokio::test]
    async fn sitemap_urls_become_snapshots() {
        let ctx = GatherContext::with_fetcher(
            Config::default(),
            Arc::new(FixedSitemap(
                "<urlset><url><loc>https://a.com/</loc></url><url><loc>https://a.com/x</loc></url></urlset>",
            )),
        );
        let raw = RawOptions::from_value(json!({
            "sitemap": "https://a.com/sitemap.xml",
            "widths": [800]
        }));
        let specs = gather(&ctx, raw).await.unwrap();
        assert_eq!(names(&specs), vec!["/", "/x"]);
        assert!(specs.iter().all(|s| s.widths == vec![800]));
    }

    #[tokio::test]
    async fn sitemap_fetch_failure_propagates() {
        let raw = RawOptions::from_value(json!({ "sitemap": "https://a.com/sitemap.xml" }));
        assert!(matches!(
            gather(&ctx(), raw).await,
            Err(ScoutError::SitemapFetch { .. })
        ));
    }

    #[tokio::test]
    async fn relative_url_without_base_is_invalid() {
        let raw = RawOptions::from_value(json!({ "url": "/relative" }));
        assert!(matches!(
            gather(&ctx(), raw).await,
            Err(ScoutError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn explicit_name_is_kept() {
        let entry = normalize_entry(json!({ "url": "https://a.com/x", "name": "Home" }), None).unwrap();
        assert_eq!(entry["name"], json!("Home"));
    }
}
