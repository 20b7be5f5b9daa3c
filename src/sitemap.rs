//! Sitemap fetching and `<loc>` extraction.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::unescape;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::{Result, ScoutError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const XML_MEDIA_TYPES: &[&str] = &["application/xml", "text/xml"];

/// A fetched document, reduced to what the crawler inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait SitemapFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Fetches sitemaps over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpSitemapFetcher {
    http: Client,
}

impl HttpSitemapFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScoutError::Network)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SitemapFetcher for HttpSitemapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let fetch_error = |e: reqwest::Error| ScoutError::SitemapFetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let resp = self.http.get(url).send().await.map_err(fetch_error)?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(fetch_error)?;

        Ok(FetchedDocument {
            status,
            content_type,
            body,
        })
    }
}

/// True for `application/xml` and `text/xml`, ignoring case and parameters.
pub fn is_xml_media_type(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    XML_MEDIA_TYPES
        .iter()
        .any(|xml| media_type.eq_ignore_ascii_case(xml))
}

/// Fetch a sitemap and return its page URLs, first occurrence first.
pub async fn gather_sitemap_urls(fetcher: &dyn SitemapFetcher, url: &str) -> Result<Vec<String>> {
    let doc = fetcher.fetch(url).await?;

    if !(200..300).contains(&doc.status) {
        return Err(ScoutError::SitemapFetch {
            url: url.to_string(),
            message: format!("unexpected status {}", doc.status),
        });
    }

    let content_type = doc.content_type.unwrap_or_default();
    if !is_xml_media_type(&content_type) {
        return Err(ScoutError::SitemapFormat {
            url: url.to_string(),
            content_type,
        });
    }

    let urls = dedup_urls(extract_locs(&doc.body));
    debug!(sitemap = url, count = urls.len(), "Parsed sitemap");
    Ok(urls)
}

/// Every non-empty `<loc>` text in document order.
pub fn extract_locs(body: &str) -> Vec<String> {
    const OPEN: &str = "<loc>";
    const CLOSE: &str = "</loc>";

    let mut locs = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        let text = after[..end].trim();
        let text = match text
            .strip_prefix("<![CDATA[")
            .and_then(|t| t.strip_suffix("]]>"))
        {
            Some(cdata) => cdata.trim().to_string(),
            None => unescape_xml(text),
        };
        if !text.is_empty() {
            locs.push(text);
        }
        rest = &after[end + CLOSE.len()..];
    }
    locs
}

/// Decode entity and character references; malformed text is kept as is.
fn unescape_xml(text: &str) -> String {
    unescape(text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Drop a URL when an earlier entry, as written, equals it with one
/// trailing slash stripped.
pub fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(urls.len());
    for url in urls {
        let stripped = url.strip_suffix('/').unwrap_or(&url);
        if seen.contains(stripped) {
            continue;
        }
        seen.insert(url.clone());
        out.push(url);
    }
    out
}
