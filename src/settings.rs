use std::path::Path;

use serde_json::Value;
use snapscout_lib::{Config, ScoutError, WidthList};

/// Load config from a TOML file or return defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ScoutError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        ScoutError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        ScoutError::Config(prefix)
    })?;

    Ok(cfg)
}

/// Apply CLI overrides on top of the loaded config.
pub fn apply_overrides(mut config: Config, widths: Option<WidthList>) -> Config {
    if let Some(widths) = widths {
        config.snapshot.widths = widths.0;
    }
    config
}

/// Read raw snapshot options from a YAML or JSON file, chosen by extension.
pub fn load_snapshot_file(path: &Path) -> Result<Value, ScoutError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let raw = std::fs::read_to_string(path)?;

    match ext.as_deref() {
        Some("yml") | Some("yaml") => serde_yaml::from_str(&raw).map_err(|e| {
            ScoutError::Config(format!("Invalid snapshot file {}: {}", path.display(), e))
        }),
        Some("json") => Ok(serde_json::from_str(&raw)?),
        _ => Err(ScoutError::Config(format!(
            "unsupported snapshot file {}",
            path.display()
        ))),
    }
}

/// Inject `--base-url` into the raw options unless the file already sets one.
pub fn with_base_url(mut options: Value, base_url: Option<String>) -> Value {
    let Some(base_url) = base_url else {
        return options;
    };
    match &mut options {
        Value::Object(map) => {
            map.entry("baseUrl").or_insert(Value::String(base_url));
            options
        }
        Value::Array(_) => serde_json::json!({ "baseUrl": base_url, "snapshots": options }),
        _ => options,
    }
}
