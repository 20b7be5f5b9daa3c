//! Snapscout Library
//!
//! Resolves loosely-specified snapshot requests into concrete capture jobs and
//! discovers, per job, the assets a page needs to be re-rendered later.
//! Requests may be a single URL, a list, a sitemap, or a deferred producer.
//!
//! # Module Overview
//!
//! - [`snapshot`] - Schema selection, validation, option merging and gathering
//! - [`sitemap`] - Sitemap fetching and URL extraction
//! - [`discovery`] - Browser-driven asset discovery and the resource cache
//! - [`logging`] - `tracing` setup and per-snapshot log capture
//! - [`config`] - Configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use snapscout_lib::{gather, Config, Discovery, GatherContext, RawOptions};
//! use snapscout_lib::discovery::NoopBrowser;
//! use snapscout_lib::logging::LogStore;
//!
//! # async fn example() -> snapscout_lib::Result<()> {
//! let ctx = GatherContext::new(Config::default())?;
//! let raw = RawOptions::from_value(serde_json::json!({
//!     "baseUrl": "https://example.com",
//!     "snapshots": ["/", "/about"]
//! }));
//! let snapshots = gather(&ctx, raw).await?;
//!
//! let discovery = Discovery::new(Arc::new(NoopBrowser), LogStore::new()).with_dry_run(true);
//! for snapshot in &snapshots {
//!     discovery.discover(snapshot, |s, _| println!("{}", s.name)).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod output;
pub mod sitemap;
pub mod snapshot;
pub mod viewport;

pub use config::Config;
pub use discovery::{Browser, Discovery, Page, Resource, ResourceCache};
pub use error::{ErrorCategory, ErrorPayload, Result, ScoutError};
pub use output::{
    DryRunEntry, DryRunOutput, ErrorOutput, ResolveOutput, ScoutOutput, SitemapOutput,
    SCOUT_OUTPUT_VERSION,
};
pub use sitemap::{gather_sitemap_urls, HttpSitemapFetcher, SitemapFetcher};
pub use snapshot::{gather, GatherContext, RawOptions, SnapshotSpec};
pub use viewport::{Viewport, WidthList};
