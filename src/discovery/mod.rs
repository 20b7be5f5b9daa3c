//! Browser-driven resource discovery.
//!
//! # Module Structure
//!
//! - [`engine`] - the [`Discovery`] owner and its per-snapshot run loop
//! - [`page`] - [`Browser`]/[`Page`] capability traits
//! - [`cache`] - shared cache and per-run overlay
//! - [`resource`] - resource type and constructors
//! - [`hostname`] - hostname allow/deny matching
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use snapscout_lib::discovery::{Discovery, NoopBrowser};
//! use snapscout_lib::logging::LogStore;
//!
//! # async fn example(spec: snapscout_lib::SnapshotSpec) -> snapscout_lib::Result<()> {
//! let discovery = Discovery::new(Arc::new(NoopBrowser), LogStore::new()).with_dry_run(true);
//! discovery
//!     .discover(&spec, |snapshot, resources| {
//!         println!("{}: {} resources", snapshot.name, resources.len());
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod hostname;
pub mod page;
pub mod resource;

pub use cache::{ResourceAccess, ResourceCache, RunResources};
pub use engine::{inject_css_link, Discovery};
pub use hostname::{hostname_matches, hostname_of};
pub use page::{
    Browser, CaptureOptions, CapturedDom, InterceptConfig, NoopBrowser, Page, PageConfig,
    RequestFilter,
};
pub use resource::{
    make_log_resource, make_percy_css_resource, make_root_resource, Resource,
};
