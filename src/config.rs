use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::viewport::{DEFAULT_MIN_HEIGHT, DEFAULT_WIDTHS};
use crate::{Result, ScoutError};

/// Default time, in milliseconds, the network must stay quiet before a page
/// counts as idle.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub snapshot: SnapshotDefaults,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotDefaults {
    pub widths: Vec<u32>,
    pub min_height: u32,
    pub percy_css: Option<String>,
    pub enable_javascript: Option<bool>,
}

impl Default for SnapshotDefaults {
    fn default() -> Self {
        Self {
            widths: DEFAULT_WIDTHS.to_vec(),
            min_height: DEFAULT_MIN_HEIGHT,
            percy_css: None,
            enable_javascript: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub allowed_hostnames: Vec<String>,
    pub disallowed_hostnames: Vec<String>,
    pub network_idle_timeout: u64,
    pub request_headers: BTreeMap<String, String>,
    pub authorization: Option<Authorization>,
    pub disable_cache: bool,
    pub user_agent: Option<String>,
    pub dry_run: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowed_hostnames: Vec::new(),
            disallowed_hostnames: Vec::new(),
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT_MS,
            request_headers: BTreeMap::new(),
            authorization: None,
            disable_cache: false,
            user_agent: None,
            dry_run: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ScoutError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.snapshot.widths.is_empty() {
            return Err(ScoutError::Config(
                "snapshot.widths must not be empty".to_string(),
            ));
        }
        if self.snapshot.widths.contains(&0) {
            return Err(ScoutError::Config(
                "snapshot.widths must only contain positive values".to_string(),
            ));
        }
        if self.snapshot.min_height == 0 {
            return Err(ScoutError::Config(
                "snapshot.min_height must be positive".to_string(),
            ));
        }
        if self.discovery.network_idle_timeout == 0 {
            return Err(ScoutError::Config(
                "discovery.network_idle_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Global snapshot options as a merge layer.
    pub fn snapshot_defaults(&self) -> Value {
        let mut layer = Map::new();
        layer.insert("widths".into(), json!(self.snapshot.widths));
        layer.insert("minHeight".into(), json!(self.snapshot.min_height));
        if let Some(css) = &self.snapshot.percy_css {
            layer.insert("percyCSS".into(), json!(css));
        }
        if let Some(js) = self.snapshot.enable_javascript {
            layer.insert("enableJavaScript".into(), json!(js));
        }
        Value::Object(layer)
    }

    /// The discovery options a snapshot may inherit. Nothing else on the
    /// discovery config reaches per-snapshot resolution.
    pub fn discovery_defaults(&self) -> Value {
        let d = &self.discovery;
        let mut discovery = Map::new();
        discovery.insert("allowedHostnames".into(), json!(d.allowed_hostnames));
        discovery.insert("disallowedHostnames".into(), json!(d.disallowed_hostnames));
        discovery.insert("networkIdleTimeout".into(), json!(d.network_idle_timeout));
        if !d.request_headers.is_empty() {
            discovery.insert("requestHeaders".into(), json!(d.request_headers));
        }
        if let Some(auth) = &d.authorization {
            discovery.insert("authorization".into(), json!(auth));
        }
        discovery.insert("disableCache".into(), json!(d.disable_cache));
        if let Some(ua) = &d.user_agent {
            discovery.insert("userAgent".into(), json!(ua));
        }
        json!({ "discovery": discovery })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.snapshot.widths, vec![375, 1280]);
        assert_eq!(cfg.snapshot.min_height, 1024);
        assert_eq!(cfg.discovery.network_idle_timeout, 100);
        assert!(!cfg.discovery.disable_cache);
        assert!(!cfg.discovery.dry_run);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[snapshot]\nwidths = [1280]\npercy_css = \"body {{ color: red }}\"\n\n[discovery]\nallowed_hostnames = [\"cdn.example.com\"]\nnetwork_idle_timeout = 250"
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.snapshot.widths, vec![1280]);
        assert_eq!(cfg.snapshot.min_height, 1024);
        assert_eq!(cfg.snapshot.percy_css.as_deref(), Some("body { color: red }"));
        assert_eq!(cfg.discovery.allowed_hostnames, vec!["cdn.example.com"]);
        assert_eq!(cfg.discovery.network_idle_timeout, 250);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[snapshot\nwidths = ").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ScoutError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_widths() {
        let mut cfg = Config::default();
        cfg.snapshot.widths.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn discovery_defaults_use_camel_case_whitelist() {
        let mut cfg = Config::default();
        cfg.discovery.user_agent = Some("snapscout".into());
        cfg.discovery.dry_run = true;
        let layer = cfg.discovery_defaults();
        let discovery = layer["discovery"].as_object().unwrap();
        assert_eq!(discovery["networkIdleTimeout"], json!(100));
        assert_eq!(discovery["userAgent"], json!("snapscout"));
        assert!(!discovery.contains_key("dryRun"));
        assert!(!discovery.contains_key("dry_run"));
    }

    #[test]
    fn snapshot_defaults_include_percy_css_only_when_set() {
        let mut cfg = Config::default();
        assert!(cfg.snapshot_defaults().get("percyCSS").is_none());
        cfg.snapshot.percy_css = Some("a".into());
        assert_eq!(cfg.snapshot_defaults()["percyCSS"], json!("a"));
    }
}
