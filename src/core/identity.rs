//! Identity atoms.
//!
//! EntityId: store key, three disjoint namespaces (roots, user ids, synthetic ids)
//! MutationId: tag for an optimistic layer
//! WatcherId: registry key for an active watch

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{CacheError, InvalidId};
use super::field_key::FieldKey;

/// Prefix reserved for writer-generated synthetic ids.
const SYNTHETIC_PREFIX: char = '$';

const ROOT_QUERY: &str = "ROOT_QUERY";
const ROOT_MUTATION: &str = "ROOT_MUTATION";
const ROOT_SUBSCRIPTION: &str = "ROOT_SUBSCRIPTION";

/// Entity identifier - key into the flat store.
///
/// Three namespaces, distinguishable by shape:
/// - operation roots (`ROOT_QUERY`, `ROOT_MUTATION`, `ROOT_SUBSCRIPTION`)
/// - user ids from the `identify` callback, never `$`-prefixed
/// - synthetic ids `$<parent>.<fieldKey>[.<index>]`, always `$`-prefixed
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn root_query() -> Self {
        Self(ROOT_QUERY.to_string())
    }

    pub fn root_mutation() -> Self {
        Self(ROOT_MUTATION.to_string())
    }

    pub fn root_subscription() -> Self {
        Self(ROOT_SUBSCRIPTION.to_string())
    }

    /// Parse a caller-provided id.
    ///
    /// Rejects empty strings and anything in the synthetic namespace.
    pub fn user(s: impl Into<String>) -> Result<Self, CacheError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Entity {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if s.starts_with(SYNTHETIC_PREFIX) {
            return Err(InvalidId::Entity {
                raw: s,
                reason: "the `$` prefix is reserved for synthetic ids".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Synthetic id for a single object under `parent.field`.
    ///
    /// The `$` prefix is prepended only when the parent is not itself
    /// synthetic, so nested synthetic ids stay in one namespace.
    pub fn synthetic_child(parent: &EntityId, field: &FieldKey) -> Self {
        if parent.is_synthetic() {
            Self(format!("{}.{}", parent.0, field.as_str()))
        } else {
            Self(format!(
                "{}{}.{}",
                SYNTHETIC_PREFIX,
                parent.0,
                field.as_str()
            ))
        }
    }

    /// Synthetic id for a list element under `parent.field`, one index per
    /// nesting level of the list.
    pub fn synthetic_element(parent: &EntityId, field: &FieldKey, indices: &[usize]) -> Self {
        let mut id = Self::synthetic_child(parent, field).0;
        for index in indices {
            id.push('.');
            id.push_str(&index.to_string());
        }
        Self(id)
    }

    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn is_operation_root(&self) -> bool {
        matches!(self.0.as_str(), ROOT_QUERY | ROOT_MUTATION | ROOT_SUBSCRIPTION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept a raw id from a deserialized snapshot.
    ///
    /// Snapshots legitimately carry synthetic ids, so only emptiness is
    /// rejected here.
    pub(crate) fn from_snapshot(s: String) -> Result<Self, CacheError> {
        if s.is_empty() {
            return Err(InvalidId::Entity {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        Ok(Self(s))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:?})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutation identifier - tags an optimistic layer. Non-empty string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    pub fn new(s: impl Into<String>) -> Result<Self, CacheError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Mutation {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutationId({:?})", self.0)
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Watcher identifier - assigned by the registry in registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WatcherId(pub(crate) u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher-{}", self.0)
    }
}

/// Caller-supplied identity resolution for normalized objects.
///
/// Returning `None` makes the writer fall back to a synthetic id derived
/// from the object's position in the result tree. Returned ids must not
/// enter the synthetic (`$`) namespace; the writer rejects those.
pub trait Identify {
    fn identify(&self, object: &Map<String, Value>) -> Option<String>;
}

impl<F> Identify for F
where
    F: Fn(&Map<String, Value>) -> Option<String>,
{
    fn identify(&self, object: &Map<String, Value>) -> Option<String> {
        self(object)
    }
}

/// Default identity: `__typename` concatenated with `id`.
///
/// Objects missing either field get no durable identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypenameId;

impl Identify for TypenameId {
    fn identify(&self, object: &Map<String, Value>) -> Option<String> {
        let typename = object.get("__typename")?.as_str()?;
        let id = match object.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(format!("{typename}{id}"))
    }
}
