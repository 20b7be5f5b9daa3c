//! Include/exclude predicates evaluated against snapshot names.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// A test over the full (unresolved) snapshot object.
pub type SnapshotTest = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Predicate {
    /// Exact name, glob, or `/regex/flags` literal.
    Pattern(String),
    Regex(Regex),
    Test(SnapshotTest),
    /// Logical OR of the entries.
    Any(Vec<Predicate>),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Predicate::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Predicate::Test(_) => f.write_str("Test(<fn>)"),
            Predicate::Any(list) => f.debug_tuple("Any").field(list).finish(),
        }
    }
}

impl Predicate {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Predicate::Pattern(pattern.into())
    }

    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Predicate::Test(Arc::new(f))
    }

    /// Strings become patterns and arrays become `Any`; anything else is
    /// not a predicate.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Predicate::Pattern(s.clone())),
            Value::Array(items) => Some(Predicate::Any(
                items.iter().filter_map(Predicate::from_value).collect(),
            )),
            _ => None,
        }
    }

    fn evaluate(&self, snapshot: &Value, name: &str) -> bool {
        match self {
            Predicate::Pattern(p) if p.is_empty() => false,
            Predicate::Pattern(p) => {
                name == p || glob_matches(p, name) || regex_literal_matches(p, name)
            }
            Predicate::Regex(re) => re.is_match(name),
            Predicate::Test(f) => f(snapshot),
            Predicate::Any(list) => list.iter().any(|p| p.evaluate(snapshot, name)),
        }
    }
}

impl From<&str> for Predicate {
    fn from(pattern: &str) -> Self {
        Predicate::Pattern(pattern.to_string())
    }
}

impl From<Regex> for Predicate {
    fn from(re: Regex) -> Self {
        Predicate::Regex(re)
    }
}

impl<P: Into<Predicate>> From<Vec<P>> for Predicate {
    fn from(list: Vec<P>) -> Self {
        Predicate::Any(list.into_iter().map(Into::into).collect())
    }
}

/// An include/exclude pair.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub include: Option<Predicate>,
    pub exclude: Option<Predicate>,
}

impl Filter {
    pub fn new(include: Option<Predicate>, exclude: Option<Predicate>) -> Self {
        Self { include, exclude }
    }

    /// Reads the `include`/`exclude` keys of an options object.
    pub fn from_options(options: &Value) -> Self {
        Self {
            include: options.get("include").and_then(Predicate::from_value),
            exclude: options.get("exclude").and_then(Predicate::from_value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    pub fn matches(&self, snapshot: &Value) -> bool {
        snapshot_matches(snapshot, self.include.as_ref(), self.exclude.as_ref())
    }
}

/// A snapshot matches when it is not excluded and is included. With neither
/// predicate present every snapshot matches.
pub fn snapshot_matches(
    snapshot: &Value,
    include: Option<&Predicate>,
    exclude: Option<&Predicate>,
) -> bool {
    if include.is_none() && exclude.is_none() {
        return true;
    }
    let name = snapshot.get("name").and_then(Value::as_str).unwrap_or("");
    !test(exclude, snapshot, name, false) && test(include, snapshot, name, true)
}

/// [`snapshot_matches`] over a destructured `{include, exclude}` pair.
pub fn matches_filter(snapshot: &Value, filter: &Filter) -> bool {
    filter.matches(snapshot)
}

fn test(predicate: Option<&Predicate>, snapshot: &Value, name: &str, fallback: bool) -> bool {
    match predicate {
        None => fallback,
        Some(Predicate::Pattern(p)) if p.is_empty() => fallback,
        Some(Predicate::Any(list)) if list.is_empty() => fallback,
        Some(p) => p.evaluate(snapshot, name),
    }
}

/// Match a glob against a name. Patterns not starting with `/` and without
/// any `/` are matched against the name's last path segment.
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let basename = !pattern.starts_with('/') && !pattern.contains('/');
    let subject = if basename {
        name.trim_end_matches('/').rsplit('/').next().unwrap_or(name)
    } else {
        name
    };

    match Regex::new(&format!("^{}$", glob_to_regex(pattern))) {
        Ok(re) => re.is_match(subject),
        Err(_) => false,
    }
}

fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                let start = i;
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                if i > start {
                    let at_segment_start = start == 0 || chars[start - 1] == '/';
                    if at_segment_start && chars.get(i + 1) == Some(&'/') {
                        out.push_str("(?:.*/)?");
                        i += 1;
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&ch| ch == ']') {
                Some(offset) if offset > 0 => {
                    let class: String = chars[i + 1..i + 1 + offset].iter().collect();
                    out.push('[');
                    match class.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            out.push_str(&rest.replace('\\', "\\\\"));
                        }
                        None => out.push_str(&class.replace('\\', "\\\\")),
                    }
                    out.push(']');
                    i += offset + 1;
                }
                _ => out.push_str(r"\["),
            },
            '{' => match chars[i + 1..].iter().position(|&ch| ch == '}') {
                Some(offset) => {
                    let body: String = chars[i + 1..i + 1 + offset].iter().collect();
                    let alternatives: Vec<String> = body.split(',').map(glob_to_regex).collect();
                    out.push_str("(?:");
                    out.push_str(&alternatives.join("|"));
                    out.push(')');
                    i += offset + 1;
                }
                None => out.push_str(r"\{"),
            },
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    out
}

fn regex_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(.+)/(\w+)?$").expect("regex literal pattern is valid"))
}

/// Test `name` against a `/pattern/flags` literal, or against the whole
/// string as a pattern when it is not shaped like one.
pub fn regex_literal_matches(literal: &str, name: &str) -> bool {
    let (pattern, flags) = match regex_literal_re().captures(literal) {
        Some(caps) => (
            caps.get(1).map_or(literal, |m| m.as_str()),
            caps.get(2).map_or("", |m| m.as_str()),
        ),
        None => (literal, ""),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' | 'y' | 'u' | 'd' | 'v' => {}
            _ => return false,
        }
    }

    builder.build().map(|re| re.is_match(name)).unwrap_or(false)
}
