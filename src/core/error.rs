//! Core capability errors (identity, fragments, encoding, limits).
//!
//! These are bounded and stable: they represent domain/refusal states,
//! not library implementation details. Partial data is never an error -
//! it surfaces as `missing` paths on reads and `Completion::Partial` on
//! writes.

use thiserror::Error;

use super::json_canon::CanonJsonError;

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("entity id `{raw}` is invalid: {reason}")]
    Entity { raw: String, reason: String },
    #[error("mutation id `{raw}` is invalid: {reason}")]
    Mutation { raw: String, reason: String },
}

/// Canonical error enum for the cache core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// The `identify` callback returned an id in the reserved synthetic
    /// namespace.
    #[error("identify returned reserved id `{id}`: caller ids must not start with `$`")]
    IdentityViolation { id: String },

    /// A write tried to replace a durable identity with a synthetic one.
    #[error("field `{field}` on `{id}` holds durable reference `{existing}`; refusing to overwrite it with a synthetic id")]
    IdentityOverwrite {
        id: String,
        field: String,
        existing: String,
    },

    #[error("fragment `{name}` is not defined in the document")]
    MissingFragment { name: String },

    #[error("document defines {count} fragments; a fragment name is required")]
    AmbiguousFragment { count: usize },

    #[error("result tree root must be an object")]
    NonObjectResult,

    #[error("fragment spread cycle through `{name}`")]
    FragmentCycle { name: String },

    #[error("variable `${name}` is not bound in the environment")]
    UnknownVariable { name: String },

    #[error("selection depth exceeds limit {limit}")]
    DepthExceeded { limit: usize },

    #[error(transparent)]
    Canon(#[from] CanonJsonError),

    #[error("no optimistic layer is tagged `{mutation}`")]
    UnknownMutation { mutation: String },

    #[error("an optimistic layer is already tagged `{mutation}`")]
    DuplicateMutation { mutation: String },

    #[error("optimistic layer limit reached ({max_layers})")]
    LayerLimit { max_layers: usize },

    #[error("watcher limit reached ({max_watchers})")]
    WatcherLimit { max_watchers: usize },
}
