use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Missing required URL for snapshot")]
    MissingUrl,

    #[error("Invalid snapshot URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("No snapshots found")]
    NoSnapshots,

    #[error("Failed to fetch sitemap {url}: {message}")]
    SitemapFetch { url: String, message: String },

    #[error("The sitemap must be an XML document, but the content-type was \"{content_type}\" ({url})")]
    SitemapFormat { url: String, content_type: String },

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Discovery was cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ScoutError {
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        ScoutError::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        ScoutError::Discovery(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ScoutError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            ScoutError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            ScoutError::MissingUrl => ErrorPayload::new(
                ErrorCategory::Snapshot,
                self.to_string(),
                "Every snapshot needs a url (or a path resolvable against baseUrl).",
            ),
            ScoutError::InvalidUrl { .. } => ErrorPayload::new(
                ErrorCategory::Snapshot,
                self.to_string(),
                "Verify URL/format (e.g., https://example.com) or pass --base-url for relative paths.",
            ),
            ScoutError::NoSnapshots => ErrorPayload::new(
                ErrorCategory::Snapshot,
                self.to_string(),
                "Check include/exclude filters; they may be rejecting every snapshot.",
            ),
            ScoutError::SitemapFetch { .. } => ErrorPayload::new(
                ErrorCategory::Sitemap,
                self.to_string(),
                "Verify the sitemap URL is reachable and returns a success status.",
            ),
            ScoutError::SitemapFormat { .. } => ErrorPayload::new(
                ErrorCategory::Sitemap,
                self.to_string(),
                "Serve the sitemap with an application/xml or text/xml content-type.",
            ),
            ScoutError::Discovery(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("timeout") || lower.contains("timed out") {
                    ErrorPayload::new(
                        ErrorCategory::Discovery,
                        self.to_string(),
                        "Try increasing discovery.network_idle_timeout or ensure the page stops requesting assets.",
                    )
                } else if lower.contains("root resource") {
                    ErrorPayload::new(
                        ErrorCategory::Discovery,
                        self.to_string(),
                        "The page produced no document markup; check the snapshot URL and enableJavaScript.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Discovery,
                        self.to_string(),
                        "Re-run with -v for discovery logs; the page was closed before this error surfaced.",
                    )
                }
            }
            ScoutError::Cancelled => ErrorPayload::new(
                ErrorCategory::Discovery,
                self.to_string(),
                "Discovery was stopped by its owner; no resources were emitted for this snapshot.",
            ),
            ScoutError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with -v for details.",
            ),
            ScoutError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("widths") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Provide at least one positive width (e.g., widths = [375, 1280]).",
                    )
                } else if lower.contains("unsupported snapshot file") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Use a .yml, .yaml or .json snapshot file.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths and the config file (TOML).",
                    )
                }
            }
            ScoutError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with -v; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Network,
    Snapshot,
    Sitemap,
    Discovery,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
