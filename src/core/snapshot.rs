//! Serializable store snapshots.
//!
//! The wire shape is `{ [entityId]: { [fieldKey]: StoreValue } }` with the
//! value encoding defined in `value`. Both maps are ordered, so identical
//! write histories serialize to byte-identical snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::EntityId;
use super::limits::Limits;
use super::store::{EntityData, StoreData, StoreView};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot holds {count} entities, limit is {max_entries}")]
    TooManyEntries { count: usize, max_entries: usize },
    #[error("snapshot contains an empty entity id")]
    EmptyEntityId,
}

/// A store captured for the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedStore {
    entities: BTreeMap<EntityId, EntityData>,
}

impl SerializedStore {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityData> {
        self.entities.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityData)> {
        self.entities.iter()
    }

    /// Capture every live entity of the given view.
    pub(crate) fn from_view(view: &dyn StoreView) -> Self {
        let mut entities = BTreeMap::new();
        for id in view.entity_ids() {
            if let Some(entity) = view.entity(&id) {
                entities.insert(id, entity.clone());
            }
        }
        Self { entities }
    }

    /// Validate and convert into a base store.
    pub(crate) fn into_store(self, limits: &Limits) -> Result<StoreData, SnapshotError> {
        if self.entities.len() > limits.max_snapshot_entries {
            return Err(SnapshotError::TooManyEntries {
                count: self.entities.len(),
                max_entries: limits.max_snapshot_entries,
            });
        }
        let mut store = StoreData::new();
        for (id, data) in self.entities {
            if id.as_str().is_empty() {
                return Err(SnapshotError::EmptyEntityId);
            }
            store.insert(id, data);
        }
        Ok(store)
    }
}
