use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::Authorization;

/// A fully resolved capture job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    pub name: String,
    pub url: String,
    pub widths: Vec<u32>,
    pub min_height: u32,
    #[serde(
        rename = "enableJavaScript",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_javascript: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_snapshot: Option<String>,
    #[serde(rename = "percyCSS", default, skip_serializing_if = "Option::is_none")]
    pub percy_css: Option<String>,
    #[serde(default)]
    pub discovery: SnapshotDiscovery,
    #[serde(default, skip_serializing_if = "ExecuteHooks::is_empty")]
    pub execute: ExecuteHooks,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_snapshots: Vec<AdditionalSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,
    #[serde(default)]
    pub meta: SnapshotMeta,
}

impl SnapshotSpec {
    /// JavaScript runs unless disabled explicitly or the markup was
    /// captured ahead of time.
    pub fn javascript_enabled(&self) -> bool {
        self.enable_javascript
            .unwrap_or(self.dom_snapshot.is_none())
    }

    /// The spec of an additional capture: this spec with the overlay's
    /// name, timing, selector, and script applied.
    pub fn with_overlay(&self, overlay: &AdditionalSnapshot) -> SnapshotSpec {
        let mut merged = self.clone();
        merged.additional_snapshots.clear();
        if let Some(name) = &overlay.name {
            merged.name = name.clone();
            merged.meta.snapshot.name = name.clone();
        }
        if overlay.wait_for_timeout.is_some() {
            merged.wait_for_timeout = overlay.wait_for_timeout;
        }
        if overlay.wait_for_selector.is_some() {
            merged.wait_for_selector = overlay.wait_for_selector.clone();
        }
        if !overlay.execute.is_empty() {
            merged.execute.before_snapshot = overlay.execute.clone();
        }
        merged
    }

    /// This spec followed by one spec per additional snapshot.
    pub fn captures(&self) -> Vec<SnapshotSpec> {
        let mut base = self.clone();
        base.additional_snapshots.clear();
        std::iter::once(base)
            .chain(self.additional_snapshots.iter().map(|o| self.with_overlay(o)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotDiscovery {
    pub allowed_hostnames: Vec<String>,
    pub disallowed_hostnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_idle_timeout: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    pub disable_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Scripts run at fixed points of a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteHooks {
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub after_navigation: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub before_resize: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub after_resize: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub before_snapshot: Vec<String>,
}

impl ExecuteHooks {
    pub fn is_empty(&self) -> bool {
        self.after_navigation.is_empty()
            && self.before_resize.is_empty()
            && self.after_resize.is_empty()
            && self.before_snapshot.is_empty()
    }
}

/// A sibling capture sharing the primary snapshot's page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub execute: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub snapshot: SnapshotIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotIdentity {
    pub name: String,
}

/// Identity of the build a snapshot belongs to, carried for log correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(script) => vec![script],
        OneOrMany::Many(scripts) => scripts,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
