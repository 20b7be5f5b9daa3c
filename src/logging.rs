//! Structured logging initialization and per-snapshot log capture.
//!
//! Library code logs through `tracing`. Events that belong to a snapshot carry
//! a `snapshot` field, either on the event itself or on an enclosing span
//! (discovery opens `info_span!("discovery", snapshot = ...)`). The
//! [`LogCapture`] layer records every such event into a [`LogStore`], which
//! discovery queries when it bundles a snapshot's logs into a resource.

use std::fmt::{self, Write as _};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer};

/// Output format for the stderr log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// One captured log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    pub timestamp_ms: u64,
}

/// Shared, append-only store of captured log lines.
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, line: LogLine) {
        self.lock().push(line);
    }

    pub fn query(&self, filter: impl Fn(&LogLine) -> bool) -> Vec<LogLine> {
        self.lock().iter().filter(|l| filter(l)).cloned().collect()
    }

    /// Every line whose snapshot name equals `name`.
    pub fn for_snapshot(&self, name: &str) -> Vec<LogLine> {
        self.query(|line| line.snapshot.as_deref() == Some(name))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Span extension holding the snapshot a span was opened for.
struct SnapshotName(String);

#[derive(Default)]
struct FieldVisitor {
    message: String,
    snapshot: Option<String>,
    extra: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "snapshot" => self.snapshot = Some(value.to_string()),
            name => {
                let _ = write!(self.extra, " {name}={value}");
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "snapshot" => self.snapshot = Some(format!("{value:?}")),
            name => {
                let _ = write!(self.extra, " {name}={value:?}");
            }
        }
    }
}

/// A `tracing` layer that records events into a [`LogStore`].
pub struct LogCapture {
    store: LogStore,
}

impl LogCapture {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for LogCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(name), Some(span)) = (visitor.snapshot, ctx.span(id)) {
            span.extensions_mut().insert(SnapshotName(name));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        // innermost span wins so nested captures log under their own name
        let snapshot = visitor.snapshot.or_else(|| {
            ctx.event_scope(event).and_then(|scope| {
                scope.into_iter().find_map(|span| {
                    let extensions = span.extensions();
                    extensions.get::<SnapshotName>().map(|s| s.0.clone())
                })
            })
        });

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.store.push(LogLine {
            level: event.metadata().level().to_string().to_ascii_lowercase(),
            target: event.metadata().target().to_string(),
            message: format!("{}{}", visitor.message, visitor.extra),
            snapshot,
            timestamp_ms,
        });
    }
}

/// Initialize the global tracing subscriber and return the store that
/// receives captured lines.
///
/// * `verbose` - 0 = info, 1 = debug, 2+ = trace
///
/// `RUST_LOG` overrides the stderr filter. Capture always records this
/// crate's events at debug and above, whatever the stderr verbosity.
pub fn init_logging(format: LogFormat, verbose: u8) -> LogStore {
    let default_directive = match verbose {
        0 => "snapscout=info,snapscout_lib=info",
        1 => "snapscout=debug,snapscout_lib=debug",
        _ => "snapscout=trace,snapscout_lib=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let store = LogStore::new();
    let capture_targets = || Targets::new().with_target("snapscout_lib", Level::DEBUG);

    match format {
        LogFormat::Json => {
            let fmt_layer = tfmt::layer()
                .json()
                .with_target(true)
                .with_writer(io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(fmt_layer)
                .with(LogCapture::new(store.clone()).with_filter(capture_targets()))
                .init();
        }
        LogFormat::Human => {
            let fmt_layer = tfmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(fmt_layer)
                .with(LogCapture::new(store.clone()).with_filter(capture_targets()))
                .init();
        }
    }

    store
}
