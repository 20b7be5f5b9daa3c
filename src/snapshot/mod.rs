//! Snapshot option resolution.
//!
//! Raw user options go through [`gather`], which picks a schema, validates
//! and scrubs the input, expands sitemaps and deferred lists, applies
//! include/exclude filters and per-rule overlays, and finally merges every
//! surviving entry with defaults and global config into a [`SnapshotSpec`].

pub mod gather;
pub mod merge;
pub mod predicate;
pub mod resolve;
pub mod schema;
pub mod spec;

pub use gather::{gather, GatherContext};
pub use predicate::{matches_filter, snapshot_matches, Filter, Predicate};
pub use resolve::{resolve, OptionRule, RawOptions, ResolvedOptions, SnapshotSource};
pub use schema::{BuiltinSchema, SchemaId, SchemaValidator, Violation};
pub use spec::{AdditionalSnapshot, BuildInfo, ExecuteHooks, SnapshotDiscovery, SnapshotMeta, SnapshotSpec};
