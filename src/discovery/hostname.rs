//! Hostname pattern matching for allow/deny lists.
//!
//! Patterns take the forms `*`, `example.com`, `*.example.com`, and
//! optionally carry a protocol and port (`https://example.com:8080`).

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?P<protocol>[^:/]+)://)?(?P<hostname>[^:/]*)(?::(?P<port>\d+))?")
            .expect("hostname pattern regex is valid")
    })
}

/// Parse a URL or a bare hostname into a URL.
fn subject_url(url_or_hostname: &str) -> Option<Url> {
    Url::parse(url_or_hostname)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("http://{url_or_hostname}")).ok())
}

/// Returns true if any pattern matches the hostname of `url_or_hostname`.
pub fn hostname_matches<S: AsRef<str>>(patterns: &[S], url_or_hostname: &str) -> bool {
    let Some(subject) = subject_url(url_or_hostname) else {
        return false;
    };
    let Some(host) = subject.host_str() else {
        return false;
    };
    let subject_port = subject.port().map(|p| p.to_string());

    patterns.iter().map(AsRef::as_ref).any(|pattern| {
        if pattern == "*" {
            return true;
        }
        let Some(caps) = pattern_re().captures(pattern) else {
            return false;
        };
        let rule_host = caps.name("hostname").map_or("", |m| m.as_str());
        if rule_host.is_empty() {
            return false;
        }
        if let Some(port) = caps.name("port") {
            if subject_port.as_deref() != Some(port.as_str()) {
                return false;
            }
        }
        if let Some(protocol) = caps.name("protocol") {
            if !protocol.as_str().eq_ignore_ascii_case(subject.scheme()) {
                return false;
            }
        }

        let rule_host = rule_host.to_ascii_lowercase();
        match rule_host.strip_prefix("*.") {
            Some(base) => host == base || host.ends_with(&format!(".{base}")),
            None => host == rule_host,
        }
    })
}

/// The hostname of a URL, if it has one.
pub fn hostname_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_hostname() {
        assert!(hostname_matches(&["a.com"], "http://a.com/page"));
        assert!(!hostname_matches(&["a.com"], "http://b.com/page"));
    }

    #[test]
    fn matches_bare_hostname_subject() {
        assert!(hostname_matches(&["a.com"], "a.com"));
    }

    #[test]
    fn wildcard_matches_subdomains_and_base() {
        let patterns = ["*.example.com"];
        assert!(hostname_matches(&patterns, "https://cdn.example.com/x.js"));
        assert!(hostname_matches(&patterns, "https://example.com/"));
        assert!(!hostname_matches(&patterns, "https://badexample.com/"));
    }

    #[test]
    fn star_matches_everything() {
        assert!(hostname_matches(&["*"], "https://anything.test"));
    }

    #[test]
    fn port_must_match_when_given() {
        assert!(hostname_matches(&["localhost:3000"], "http://localhost:3000/"));
        assert!(!hostname_matches(&["localhost:3000"], "http://localhost:4000/"));
    }

    #[test]
    fn protocol_must_match_when_given() {
        assert!(hostname_matches(&["https://a.com"], "https://a.com/"));
        assert!(!hostname_matches(&["https://a.com"], "http://a.com/"));
    }

    #[test]
    fn empty_patterns_never_match() {
        let none: [&str; 0] = [];
        assert!(!hostname_matches(&none, "https://a.com"));
        assert!(!hostname_matches(&[""], "https://a.com"));
    }

    #[test]
    fn hostname_of_extracts_host() {
        assert_eq!(hostname_of("https://a.com:8080/x").as_deref(), Some("a.com"));
        assert_eq!(hostname_of("nope"), None);
    }
}
