use thiserror::Error;

use crate::core::{CacheError, SnapshotError};

/// Crate-level convenience error.
///
/// A thin wrapper over the canonical capability errors; match on the
/// inner kinds for precise handling.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
