//! Browser capability traits the discovery engine drives.
//!
//! The engine never talks to a browser directly. A [`Browser`] opens pages
//! and a [`Page`] performs one action per call; real engines (CDP,
//! WebDriver) and test fakes both sit behind these traits.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use super::cache::ResourceAccess;
use super::hostname::hostname_matches;
use crate::config::Authorization;
use crate::snapshot::{SnapshotMeta, SnapshotSpec};
use crate::viewport::Viewport;
use crate::{Result, ScoutError};

/// Decides which request URLs count toward network idle.
pub type RequestFilter = dyn Fn(&str) -> bool + Send + Sync;

/// Request interception settings for a page.
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    /// Where intercepted responses are looked up and saved.
    pub resources: ResourceAccess,
    pub allowed_hostnames: Vec<String>,
    pub disallowed_hostnames: Vec<String>,
}

impl InterceptConfig {
    /// Whether a response from `url` should be captured.
    pub fn should_capture(&self, url: &str) -> bool {
        hostname_matches(&self.allowed_hostnames, url)
            && !hostname_matches(&self.disallowed_hostnames, url)
    }

    /// Whether a request to `url` should be aborted outright.
    pub fn should_block(&self, url: &str) -> bool {
        hostname_matches(&self.disallowed_hostnames, url)
    }
}

/// Everything a browser needs to open a page for one snapshot.
#[derive(Debug, Clone)]
pub struct PageConfig {
    pub enable_javascript: bool,
    pub network_idle_timeout: Duration,
    pub request_headers: BTreeMap<String, String>,
    pub authorization: Option<Authorization>,
    pub user_agent: Option<String>,
    pub meta: SnapshotMeta,
    pub intercept: InterceptConfig,
}

/// Per-capture settings for [`Page::snapshot`].
///
/// The page runs `execute`, honours the wait settings, and waits for network
/// idle before serializing the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub name: String,
    pub execute: Vec<String>,
    pub wait_for_timeout: Option<Duration>,
    pub wait_for_selector: Option<String>,
    pub enable_javascript: bool,
}

impl CaptureOptions {
    pub fn from_spec(spec: &SnapshotSpec) -> Self {
        Self {
            name: spec.name.clone(),
            execute: spec.execute.before_snapshot.clone(),
            wait_for_timeout: spec.wait_for_timeout.map(Duration::from_millis),
            wait_for_selector: spec.wait_for_selector.clone(),
            enable_javascript: spec.javascript_enabled(),
        }
    }
}

/// Serialized document returned by a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDom {
    /// The URL the page ended up on.
    pub url: String,
    pub dom: String,
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_page(&self, config: PageConfig) -> Result<Box<dyn Page>>;
}

/// A single open page.
#[async_trait]
pub trait Page: Send {
    async fn resize(&mut self, viewport: Viewport) -> Result<()>;
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn evaluate(&mut self, script: &str) -> Result<()>;
    async fn snapshot(&mut self, options: &CaptureOptions) -> Result<CapturedDom>;
    /// Resolves once no request passing `filter` has been in flight for
    /// `timeout`.
    async fn network_idle(&mut self, filter: &RequestFilter, timeout: Duration) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// A browser that cannot open pages. Dry runs never ask it to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBrowser;

#[async_trait]
impl Browser for NoopBrowser {
    async fn open_page(&self, _config: PageConfig) -> Result<Box<dyn Page>> {
        Err(ScoutError::discovery(
            "no browser engine is configured; only dry runs are available",
        ))
    }
}
