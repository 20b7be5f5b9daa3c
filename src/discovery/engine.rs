use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cache::{ResourceAccess, ResourceCache, RunResources};
use super::hostname::hostname_matches;
use super::page::{Browser, CaptureOptions, InterceptConfig, Page, PageConfig};
use super::resource::{
    make_log_resource, make_percy_css_resource, make_root_resource, Resource,
};
use crate::config::{DiscoveryConfig, DEFAULT_NETWORK_IDLE_TIMEOUT_MS};
use crate::logging::LogStore;
use crate::snapshot::SnapshotSpec;
use crate::viewport::Viewport;
use crate::{Result, ScoutError};

/// Owns the resource cache shared by every discovery run it performs.
///
/// Clones share the browser, cache, log store, and cancellation token.
#[derive(Clone)]
pub struct Discovery {
    browser: Arc<dyn Browser>,
    cache: ResourceCache,
    logs: LogStore,
    dry_run: bool,
    cancel: CancellationToken,
}

impl Discovery {
    pub fn new(browser: Arc<dyn Browser>, logs: LogStore) -> Self {
        Self {
            browser,
            cache: ResourceCache::new(),
            logs,
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply the engine-level settings of the global discovery config.
    /// Per-snapshot settings travel on each [`SnapshotSpec`] instead.
    pub fn with_config(self, config: &DiscoveryConfig) -> Self {
        self.with_dry_run(config.dry_run)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every in-flight and future run at its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Discover the resources of `spec` and each of its additional
    /// snapshots, handing every finished set to `on_resources`.
    ///
    /// The page is closed on every exit path before an error is returned.
    pub async fn discover<F>(&self, spec: &SnapshotSpec, mut on_resources: F) -> Result<()>
    where
        F: FnMut(&SnapshotSpec, Vec<Resource>) + Send,
    {
        let span = info_span!("discovery", snapshot = %spec.name);
        self.run(spec, &mut on_resources).instrument(span).await
    }

    async fn run<F>(&self, spec: &SnapshotSpec, on_resources: &mut F) -> Result<()>
    where
        F: FnMut(&SnapshotSpec, Vec<Resource>) + Send,
    {
        if self.dry_run {
            for capture in spec.captures() {
                info!(snapshot = %capture.name, "Snapshot found (dry run)");
                on_resources(&capture, Vec::new());
            }
            return Ok(());
        }

        let run = RunResources::new();
        if let Some(dom) = &spec.dom_snapshot {
            run.insert(Arc::new(make_root_resource(&spec.url, dom)));
        }

        let cache = (!spec.discovery.disable_cache).then(|| self.cache.clone());
        let config = page_config(spec, ResourceAccess::new(run.clone(), cache));
        let mut page = self.step(self.browser.open_page(config)).await?;
        debug!("Page opened");

        let result = self.drive(page.as_mut(), spec, &run, on_resources).await;
        let closed = page.close().await;

        match (result, closed) {
            (Ok(()), Ok(())) => {
                debug!(resources = run.len(), "Discovery finished");
                Ok(())
            }
            (Ok(()), Err(close_err)) => Err(ScoutError::discovery(format!(
                "failed to close page: {close_err}"
            ))),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close page after discovery error");
                Err(err)
            }
        }
    }

    async fn drive<F>(
        &self,
        page: &mut dyn Page,
        spec: &SnapshotSpec,
        run: &RunResources,
        on_resources: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&SnapshotSpec, Vec<Resource>) + Send,
    {
        let timeout = Duration::from_millis(
            spec.discovery
                .network_idle_timeout
                .unwrap_or(DEFAULT_NETWORK_IDLE_TIMEOUT_MS),
        );
        let allowed = spec.discovery.allowed_hostnames.clone();
        let idle_filter = move |url: &str| hostname_matches(&allowed, url);

        let (first, rest) = spec
            .widths
            .split_first()
            .ok_or_else(|| ScoutError::discovery(format!("no widths to capture for {}", spec.name)))?;

        self.step(page.resize(Viewport::new(*first, spec.min_height)))
            .await?;
        debug!(url = %spec.url, "Navigating");
        self.step(page.navigate(&spec.url)).await?;
        self.run_scripts(page, &spec.execute.after_navigation).await?;

        for width in rest {
            self.run_scripts(page, &spec.execute.before_resize).await?;
            self.step(page.network_idle(&idle_filter, timeout)).await?;
            debug!(width, "Resizing");
            self.step(page.resize(Viewport::new(*width, spec.min_height)))
                .await?;
            self.run_scripts(page, &spec.execute.after_resize).await?;
        }

        if spec.dom_snapshot.is_some() {
            self.step(page.network_idle(&idle_filter, timeout)).await?;
            return self.handle_snapshot_resources(spec, run, on_resources);
        }

        for capture in spec.captures() {
            let span = info_span!("capture", snapshot = %capture.name);
            let captured = self
                .step(page.snapshot(&CaptureOptions::from_spec(&capture)))
                .instrument(span.clone())
                .await?;

            let root = make_root_resource(&captured.url, &captured.dom);
            let root_url = root.url.clone();
            run.insert(Arc::new(root));
            let finalized =
                span.in_scope(|| self.handle_snapshot_resources(&capture, run, on_resources));
            run.remove(&root_url);
            finalized?;
        }

        Ok(())
    }

    async fn run_scripts(&self, page: &mut dyn Page, scripts: &[String]) -> Result<()> {
        for script in scripts {
            self.step(page.evaluate(script)).await?;
        }
        Ok(())
    }

    /// Race one page action against cancellation.
    async fn step<T>(&self, action: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScoutError::Cancelled),
            result = action => result,
        }
    }

    /// Order the run's resources root first, add the CSS and log resources,
    /// and hand them to the callback.
    fn handle_snapshot_resources<F>(
        &self,
        spec: &SnapshotSpec,
        run: &RunResources,
        on_resources: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&SnapshotSpec, Vec<Resource>),
    {
        let mut resources: Vec<Resource> = run
            .snapshot()
            .iter()
            .map(|resource| Resource::clone(resource))
            .collect();

        let root_index = resources
            .iter()
            .position(|r| r.root)
            .ok_or_else(|| ScoutError::discovery(format!("missing root resource for {}", spec.name)))?;
        let mut root = resources.remove(root_index);

        if let Some(css) = spec.percy_css.as_deref().filter(|css| !css.is_empty()) {
            let css_resource = make_percy_css_resource(&root.url, css);
            if let Some(html) = inject_css_link(&root.content_str(), &css_resource.pathname()) {
                let mut rewritten = Resource::new(&root.url, html, root.mimetype.as_deref());
                rewritten.root = true;
                root = rewritten;
            }
            resources.push(css_resource);
        }
        resources.insert(0, root);

        let lines = self.logs.for_snapshot(&spec.name);
        resources.push(make_log_resource(&lines));

        debug!(resources = resources.len(), "Snapshot resources ready");
        on_resources(spec, resources);
        Ok(())
    }
}

fn page_config(spec: &SnapshotSpec, resources: ResourceAccess) -> PageConfig {
    PageConfig {
        enable_javascript: spec.javascript_enabled(),
        network_idle_timeout: Duration::from_millis(
            spec.discovery
                .network_idle_timeout
                .unwrap_or(DEFAULT_NETWORK_IDLE_TIMEOUT_MS),
        ),
        request_headers: spec.discovery.request_headers.clone(),
        authorization: spec.discovery.authorization.clone(),
        user_agent: spec.discovery.user_agent.clone(),
        meta: spec.meta.clone(),
        intercept: InterceptConfig {
            resources,
            allowed_hostnames: spec.discovery.allowed_hostnames.clone(),
            disallowed_hostnames: spec.discovery.disallowed_hostnames.clone(),
        },
    }
}

/// Insert the stylesheet link before the last `</body>`, ignoring case.
/// Returns `None` when the markup has no closing body tag.
pub fn inject_css_link(html: &str, href: &str) -> Option<String> {
    let index = html.to_ascii_lowercase().rfind("</body>")?;
    let link = format!(r#"<link data-percy-specific-css rel="stylesheet" href="{href}"/>"#);
    let mut out = String::with_capacity(html.len() + link.len());
    out.push_str(&html[..index]);
    out.push_str(&link);
    out.push_str(&html[index..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::discovery::page::{CapturedDom, RequestFilter};
    use crate::logging::LogCapture;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    type Events = Arc<Mutex<Vec<String>>>;

    #[derive(Default, Clone)]
    struct FakeBrowser {
        events: Events,
        fail_on: Option<&'static str>,
        cancel_on_navigate: Option<CancellationToken>,
        configs: Arc<Mutex<Vec<PageConfig>>>,
        fetched: Arc<AtomicUsize>,
    }

    impl FakeBrowser {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    struct FakePage {
        browser: FakeBrowser,
        intercept: InterceptConfig,
    }

    impl FakePage {
        fn record(&self, event: String) -> Result<()> {
            let failing = self
                .browser
                .fail_on
                .is_some_and(|prefix| event.starts_with(prefix));
            self.browser.events.lock().unwrap().push(event);
            if failing {
                Err(ScoutError::discovery("page crashed"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Browser for FakeBrowser {
        async fn open_page(&self, config: PageConfig) -> Result<Box<dyn Page>> {
            self.events.lock().unwrap().push("open".into());
            let intercept = config.intercept.clone();
            self.configs.lock().unwrap().push(config);
            Ok(Box::new(FakePage {
                browser: self.clone(),
                intercept,
            }))
        }
    }

    #[async_trait]
    impl Page for FakePage {
        async fn resize(&mut self, viewport: Viewport) -> Result<()> {
            self.record(format!("resize {viewport}"))
        }

        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.record(format!("navigate {url}"))?;
            let asset = "https://a.com/app.js";
            if self.intercept.should_capture(asset) {
                match self.intercept.resources.get(asset) {
                    Some(hit) => self.intercept.resources.run().insert(hit),
                    None => {
                        self.browser.fetched.fetch_add(1, Ordering::SeqCst);
                        self.intercept.resources.save(Resource::new(
                            asset,
                            "console.log(1)",
                            Some("application/javascript"),
                        ));
                    }
                }
            }
            if let Some(token) = &self.browser.cancel_on_navigate {
                token.cancel();
            }
            Ok(())
        }

        async fn evaluate(&mut self, script: &str) -> Result<()> {
            self.record(format!("eval {script}"))
        }

        async fn snapshot(&mut self, options: &CaptureOptions) -> Result<CapturedDom> {
            self.record(format!("snapshot {}", options.name))?;
            Ok(CapturedDom {
                url: "https://a.com/page".into(),
                dom: format!("<html><BODY>{}</BODY></html>", options.name),
            })
        }

        async fn network_idle(&mut self, filter: &RequestFilter, timeout: Duration) -> Result<()> {
            let allowed = filter("https://a.com/x.css");
            self.record(format!("idle {}ms allowed={allowed}", timeout.as_millis()))
        }

        async fn close(&mut self) -> Result<()> {
            self.record("close".into())
        }
    }

    fn spec(value: serde_json::Value) -> SnapshotSpec {
        let mut base = json!({
            "name": "/page",
            "url": "https://a.com/page",
            "widths": [375, 1280],
            "minHeight": 1024,
            "discovery": { "allowedHostnames": ["a.com"] },
            "meta": { "snapshot": { "name": "/page" } }
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), value.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    type Emitted = Vec<(String, Vec<Resource>)>;

    async fn collect(discovery: &Discovery, spec: &SnapshotSpec) -> (Result<()>, Emitted) {
        let mut emitted = Vec::new();
        let result = discovery
            .discover(spec, |s, resources| emitted.push((s.name.clone(), resources)))
            .await;
        (result, emitted)
    }

    fn discovery(browser: &FakeBrowser) -> Discovery {
        Discovery::new(Arc::new(browser.clone()), LogStore::new())
    }

    #[tokio::test]
    async fn live_capture_runs_steps_in_order() {
        let browser = FakeBrowser::default();
        let spec = spec(json!({
            "execute": {
                "afterNavigation": "nav()",
                "beforeResize": "before()",
                "afterResize": "after()"
            },
            "additionalSnapshots": [{ "name": "/page (menu)", "execute": "menu()" }]
        }));

        let (result, emitted) = collect(&discovery(&browser), &spec).await;
        result.unwrap();

        assert_eq!(
            browser.events(),
            vec![
                "open",
                "resize 375x1024",
                "navigate https://a.com/page",
                "eval nav()",
                "eval before()",
                "idle 100ms allowed=true",
                "resize 1280x1024",
                "eval after()",
                "snapshot /page",
                "snapshot /page (menu)",
                "close",
            ]
        );

        let names: Vec<_> = emitted.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["/page", "/page (menu)"]);
        for (name, resources) in &emitted {
            assert!(resources[0].root);
            assert!(resources[0].content_str().contains(name.as_str()));
            assert_eq!(resources.iter().filter(|r| r.root).count(), 1);
            assert!(resources.last().unwrap().log);
            assert!(resources.iter().any(|r| r.url == "https://a.com/app.js"));
        }
    }

    #[tokio::test]
    async fn failure_closes_page_exactly_once() {
        let browser = FakeBrowser {
            fail_on: Some("navigate"),
            ..FakeBrowser::default()
        };
        let (result, emitted) = collect(&discovery(&browser), &spec(json!({}))).await;

        assert!(matches!(result, Err(ScoutError::Discovery(ref m)) if m == "page crashed"));
        assert!(emitted.is_empty());
        assert_eq!(browser.count("close"), 1);
        assert_eq!(browser.events().last().map(String::as_str), Some("close"));
        assert_eq!(browser.count("resize 1280"), 0);
    }

    #[tokio::test]
    async fn capture_failure_surfaces_original_error() {
        let browser = FakeBrowser {
            fail_on: Some("snapshot"),
            ..FakeBrowser::default()
        };
        let (result, _) = collect(&discovery(&browser), &spec(json!({}))).await;
        assert!(matches!(result, Err(ScoutError::Discovery(ref m)) if m == "page crashed"));
        assert_eq!(browser.count("close"), 1);
    }

    #[tokio::test]
    async fn failed_close_after_success_is_an_error() {
        let browser = FakeBrowser {
            fail_on: Some("close"),
            ..FakeBrowser::default()
        };
        let (result, emitted) = collect(&discovery(&browser), &spec(json!({}))).await;
        assert!(matches!(result, Err(ScoutError::Discovery(ref m)) if m.contains("close")));
        assert_eq!(emitted.len(), 1);
    }

    #[tokio::test]
    async fn dry_run_emits_every_capture_without_a_page() {
        let browser = FakeBrowser::default();
        let discovery = discovery(&browser).with_dry_run(true);
        let spec = spec(json!({ "additionalSnapshots": [{ "name": "/page (2)" }] }));

        let (result, emitted) = collect(&discovery, &spec).await;
        result.unwrap();

        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|(_, resources)| resources.is_empty()));
        assert!(browser.events().is_empty());
    }

    #[tokio::test]
    async fn dom_snapshot_mode_finalizes_primary_once() {
        let browser = FakeBrowser::default();
        let spec = spec(json!({
            "domSnapshot": "<html><body>pre-rendered</body></html>",
            "percyCSS": "p { color: red }",
            "discovery": { "allowedHostnames": ["a.com"], "networkIdleTimeout": 250 }
        }));

        let (result, emitted) = collect(&discovery(&browser), &spec).await;
        result.unwrap();

        assert_eq!(browser.count("snapshot"), 0);
        assert_eq!(browser.count("idle 250ms"), 2);
        assert_eq!(emitted.len(), 1);

        let resources = &emitted[0].1;
        let root = &resources[0];
        assert!(root.root);
        assert_eq!(root.url, "https://a.com/page");
        let css = resources
            .iter()
            .find(|r| r.mimetype.as_deref() == Some("text/css"))
            .unwrap();
        let html = root.content_str();
        assert!(html.contains(&format!(
            r#"<link data-percy-specific-css rel="stylesheet" href="{}"/></body>"#,
            css.pathname()
        )));
        assert_eq!(root.sha, crate::discovery::resource::sha256_hex(html.as_bytes()));

        let configs = browser.configs.lock().unwrap();
        assert!(!configs[0].enable_javascript);
    }

    #[tokio::test]
    async fn cache_is_shared_between_runs_unless_disabled() {
        let browser = FakeBrowser::default();
        let discovery = discovery(&browser);

        let (result, _) = collect(&discovery, &spec(json!({ "discovery": { "allowedHostnames": ["a.com"], "disableCache": true } }))).await;
        result.unwrap();
        assert!(discovery.cache().is_empty());

        let (result, _) = collect(&discovery, &spec(json!({}))).await;
        result.unwrap();
        assert!(discovery.cache().get("https://a.com/app.js").is_some());

        let (result, emitted) = collect(&discovery, &spec(json!({}))).await;
        result.unwrap();
        assert!(emitted[0].1.iter().any(|r| r.url == "https://a.com/app.js"));
        assert_eq!(browser.fetched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn configured_dry_run_skips_the_browser() {
        let browser = FakeBrowser::default();
        let mut config = Config::default();
        config.discovery.dry_run = true;
        let discovery = discovery(&browser).with_config(&config.discovery);

        let (result, emitted) = collect(&discovery, &spec(json!({}))).await;
        result.unwrap();
        assert_eq!(emitted.len(), 1);
        assert!(browser.events().is_empty());

        let live = discovery.with_config(&Config::default().discovery);
        let (result, _) = collect(&live, &spec(json!({}))).await;
        result.unwrap();
        assert_eq!(browser.count("open"), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_at_next_step_and_closes() {
        let token = CancellationToken::new();
        let browser = FakeBrowser {
            cancel_on_navigate: Some(token.clone()),
            ..FakeBrowser::default()
        };
        let discovery = discovery(&browser).with_cancellation(token);

        let (result, emitted) = collect(&discovery, &spec(json!({}))).await;
        assert!(matches!(result, Err(ScoutError::Cancelled)));
        assert!(emitted.is_empty());
        assert_eq!(browser.count("close"), 1);
        assert_eq!(browser.count("resize"), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_opens_no_page() {
        let browser = FakeBrowser::default();
        let discovery = discovery(&browser);
        discovery.cancel();

        let (result, _) = collect(&discovery, &spec(json!({}))).await;
        assert!(matches!(result, Err(ScoutError::Cancelled)));
        assert!(browser.events().is_empty());
    }

    #[tokio::test]
    async fn snapshot_logs_are_bundled() {
        let logs = LogStore::new();
        let subscriber = tracing_subscriber::registry().with(LogCapture::new(logs.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let browser = FakeBrowser::default();
        let discovery = Discovery::new(Arc::new(browser.clone()), logs);
        let (result, emitted) = collect(&discovery, &spec(json!({}))).await;
        result.unwrap();

        let log = emitted[0].1.last().unwrap();
        assert!(log.log);
        assert!(log.content_str().contains("Navigating"));
    }

    #[test]
    fn missing_root_is_a_discovery_error() {
        let discovery = discovery(&FakeBrowser::default());
        let err = discovery
            .handle_snapshot_resources(
                &spec(json!({})),
                &RunResources::new(),
                &mut |_: &SnapshotSpec, _: Vec<Resource>| {},
            )
            .unwrap_err();
        assert!(err.to_string().contains("missing root resource"));
    }

    #[test]
    fn css_link_goes_before_last_body_close() {
        let html = "<body>a</body><BODY>b</Body>";
        let out = inject_css_link(html, "/x.css").unwrap();
        assert_eq!(
            out,
            r#"<body>a</body><BODY>b<link data-percy-specific-css rel="stylesheet" href="/x.css"/></Body>"#
        );
        assert!(inject_css_link("<html></html>", "/x.css").is_none());
    }
}
