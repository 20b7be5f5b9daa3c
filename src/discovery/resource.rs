use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::logging::LogLine;

/// One discovered (or synthesized) asset belonging to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Canonical URL, fragment stripped.
    pub url: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    /// Hex SHA-256 of `content`.
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub root: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub log: bool,
}

impl Resource {
    pub fn new(url: &str, content: impl Into<Vec<u8>>, mimetype: Option<&str>) -> Self {
        let content = content.into();
        Self {
            url: normalize_url(url),
            sha: sha256_hex(&content),
            content,
            mimetype: mimetype.map(str::to_string),
            root: false,
            log: false,
        }
    }

    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Path component of the resource URL (or the URL itself when relative).
    pub fn pathname(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Strip the fragment so `page#a` and `page#b` share one resource.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.split('#').next().unwrap_or(raw).to_string(),
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// The document markup for a snapshot.
pub fn make_root_resource(url: &str, content: &str) -> Resource {
    let mut resource = Resource::new(url, content, Some("text/html"));
    resource.root = true;
    resource
}

/// The injected stylesheet, served next to the root document.
pub fn make_percy_css_resource(root_url: &str, css: &str) -> Resource {
    let file = format!("/percy-specific.{}.css", now_millis());
    let url = Url::parse(root_url)
        .and_then(|u| u.join(&file))
        .map(|u| u.to_string())
        .unwrap_or(file);
    Resource::new(&url, css, Some("text/css"))
}

/// Bundle the log lines that belong to one snapshot.
pub fn make_log_resource(lines: &[LogLine]) -> Resource {
    let content = serde_json::to_vec(lines).unwrap_or_else(|_| b"[]".to_vec());
    let mut resource = Resource::new(
        &format!("/percy.{}.log", now_millis()),
        content,
        Some("text/plain"),
    );
    resource.log = true;
    resource
}
