#![forbid(unsafe_code)]

//! Normalized GraphQL result cache.
//!
//! Query-shaped result trees are shredded into a flat keyed store of
//! entities and reassembled against any compatible selection set. A stack
//! of optimistic overlays supports speculative mutations that commit or
//! roll back independently, and watchers are re-read and notified when a
//! write intersects their dependency set.

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::cache::{Cache, FragmentWrite};
pub use crate::config::CacheConfig;
pub use crate::core::{
    Argument, ArgumentValue, CacheError, CanonJsonError, Completion, Document, EntityData,
    EntityId, EntityRef, Field, FieldKey, FragmentDefinition, FragmentSpread, Identify,
    InlineFragment, InvalidId, Limits, ListItem, MutationId, OptimisticWriter, Path, PathSegment,
    ReadResult, Selection, SelectionSet, SerializedStore, SnapshotError, StoreValue, TypenameId,
    Variables, WatchHandle, WatchSubscription, WatchUpdate, WatcherId, WriteOutcome, field_key,
    to_canon_json_string,
};
