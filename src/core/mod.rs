//! Cache core.
//!
//! Module hierarchy follows type dependency order:
//! - json_canon: canonical JSON primitives
//! - error: capability errors
//! - document: consumed selection AST
//! - field_key: argument-aware storage keys
//! - identity: entity / mutation / watcher ids
//! - value: store value taxonomy
//! - store: flat store and layered views
//! - limits: traversal and registry bounds
//! - reconcile: synthetic-to-real identity merging
//! - write / read: normalizer and denormalizer
//! - optimistic: overlay layers and rebase
//! - watch: watcher registry and notification
//! - snapshot: wire-format extract/restore

pub mod document;
pub mod error;
pub mod field_key;
pub mod identity;
pub mod json_canon;
pub mod limits;
pub mod optimistic;
pub mod read;
pub(crate) mod reconcile;
pub mod snapshot;
pub mod store;
pub mod value;
pub mod watch;
pub mod write;

pub use document::{
    Argument, ArgumentValue, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    Selection, SelectionSet,
};
pub use error::{CacheError, InvalidId};
pub use field_key::{FieldKey, Variables, field_key};
pub use identity::{EntityId, Identify, MutationId, TypenameId, WatcherId};
pub use json_canon::{CanonJsonError, to_canon_json_string};
pub use limits::Limits;
pub use optimistic::{OptimisticWriteFn, OptimisticWriter};
pub use read::{Path, PathSegment, ReadResult};
pub use snapshot::{SerializedStore, SnapshotError};
pub use store::EntityData;
pub use value::{EntityRef, ListItem, StoreValue};
pub use watch::{WatchHandle, WatchSubscription, WatchUpdate};
pub use write::{Completion, WriteOutcome};
