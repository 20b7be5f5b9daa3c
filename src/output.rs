use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;
use crate::snapshot::SnapshotSpec;
use crate::viewport::Viewport;

/// Schema version for output payloads.
pub const SCOUT_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ScoutOutput {
    Resolve(ResolveOutput),
    Sitemap(SitemapOutput),
    DryRun(DryRunOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutput {
    pub version: String,
    pub count: usize,
    pub snapshots: Vec<SnapshotSpec>,
}

impl ResolveOutput {
    pub fn new(snapshots: Vec<SnapshotSpec>) -> Self {
        Self {
            version: SCOUT_OUTPUT_VERSION.to_string(),
            count: snapshots.len(),
            snapshots,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapOutput {
    pub version: String,
    pub sitemap: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunOutput {
    pub version: String,
    pub snapshots: Vec<DryRunEntry>,
}

/// One snapshot a dry run would have captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunEntry {
    pub name: String,
    pub url: String,
    pub viewports: Vec<Viewport>,
}

impl DryRunEntry {
    pub fn from_spec(spec: &SnapshotSpec) -> Self {
        Self {
            name: spec.name.clone(),
            url: spec.url.clone(),
            viewports: spec
                .widths
                .iter()
                .map(|w| Viewport::new(*w, spec.min_height))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
