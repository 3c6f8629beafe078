//! Flat keyed store and its layered views.
//!
//! `StoreData` is the base layer's sole mutable state. Optimistic layers
//! shadow it entity-by-entity through `LayerDiff`; `EffectiveView` is the
//! read view over base-plus-layers. All mutation is entity-granular: an
//! overlay write copies the entity out of the effective view before
//! touching it, so layers always hold whole entities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::field_key::FieldKey;
use super::identity::EntityId;
use super::value::StoreValue;

/// One normalized entity: field-key to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityData {
    fields: BTreeMap<FieldKey, StoreValue>,
}

impl EntityData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FieldKey) -> Option<&StoreValue> {
        self.fields.get(key)
    }

    /// Insert a field value; reports whether the stored value changed.
    /// Rewriting an identical value is a no-op.
    pub fn set(&mut self, key: FieldKey, value: StoreValue) -> bool {
        match self.fields.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.fields.insert(key, value);
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &StoreValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(FieldKey, StoreValue)> for EntityData {
    fn from_iter<I: IntoIterator<Item = (FieldKey, StoreValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Base store: entity id to entity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreData {
    entities: BTreeMap<EntityId, EntityData>,
}

impl StoreData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityData> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityData)> {
        self.entities.iter()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub(crate) fn insert(&mut self, id: EntityId, data: EntityData) {
        self.entities.insert(id, data);
    }
}

/// Read access over some store shape (base, overlay, or staged).
pub(crate) trait StoreView {
    fn entity(&self, id: &EntityId) -> Option<&EntityData>;

    /// Every id with a live entity in this view.
    fn entity_ids(&self) -> BTreeSet<EntityId>;

    fn field(&self, id: &EntityId, key: &FieldKey) -> Option<&StoreValue> {
        self.entity(id).and_then(|entity| entity.get(key))
    }
}

/// Mutation access. Change reporting is per-field so identical rewrites
/// stay invisible to watchers.
pub(crate) trait StoreWrite: StoreView {
    /// Set one field; true iff the effective value changed.
    fn set_field(&mut self, id: &EntityId, key: FieldKey, value: StoreValue) -> bool;

    /// Replace a whole entity; true iff the effective entity changed.
    fn replace_entity(&mut self, id: EntityId, data: EntityData) -> bool;

    /// Remove an entity; true iff it was present in the effective view.
    fn remove_entity(&mut self, id: &EntityId) -> bool;
}

impl StoreView for StoreData {
    fn entity(&self, id: &EntityId) -> Option<&EntityData> {
        self.entities.get(id)
    }

    fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.entities.keys().cloned().collect()
    }
}

impl StoreWrite for StoreData {
    fn set_field(&mut self, id: &EntityId, key: FieldKey, value: StoreValue) -> bool {
        self.entities.entry(id.clone()).or_default().set(key, value)
    }

    fn replace_entity(&mut self, id: EntityId, data: EntityData) -> bool {
        match self.entities.get(&id) {
            Some(existing) if *existing == data => false,
            _ => {
                self.entities.insert(id, data);
                true
            }
        }
    }

    fn remove_entity(&mut self, id: &EntityId) -> bool {
        self.entities.remove(id).is_some()
    }
}

/// Entity-granular diff held by one optimistic layer. `None` is a deletion
/// marker shadowing the layers beneath.
pub(crate) type LayerDiff = BTreeMap<EntityId, Option<EntityData>>;

/// Read view over the base store plus an ordered stack of layer diffs.
/// Later diffs shadow earlier ones.
#[derive(Clone)]
pub(crate) struct EffectiveView<'a> {
    base: &'a StoreData,
    diffs: Vec<&'a LayerDiff>,
}

impl<'a> EffectiveView<'a> {
    pub(crate) fn new(base: &'a StoreData, diffs: Vec<&'a LayerDiff>) -> Self {
        Self { base, diffs }
    }
}

impl StoreView for EffectiveView<'_> {
    fn entity(&self, id: &EntityId) -> Option<&EntityData> {
        for diff in self.diffs.iter().rev() {
            if let Some(entry) = diff.get(id) {
                return entry.as_ref();
            }
        }
        self.base.get(id)
    }

    fn entity_ids(&self) -> BTreeSet<EntityId> {
        let mut ids = self.base.entity_ids();
        for diff in &self.diffs {
            for (id, entry) in diff.iter() {
                match entry {
                    Some(_) => {
                        ids.insert(id.clone());
                    }
                    None => {
                        ids.remove(id);
                    }
                }
            }
        }
        ids
    }
}

/// Write target for one optimistic layer: reads fall through to the view
/// below, writes copy the entity into this layer's diff.
pub(crate) struct LayerWriter<'a> {
    below: EffectiveView<'a>,
    diff: &'a mut LayerDiff,
}

impl<'a> LayerWriter<'a> {
    pub(crate) fn new(below: EffectiveView<'a>, diff: &'a mut LayerDiff) -> Self {
        Self { below, diff }
    }
}

impl StoreView for LayerWriter<'_> {
    fn entity(&self, id: &EntityId) -> Option<&EntityData> {
        if let Some(entry) = self.diff.get(id) {
            return entry.as_ref();
        }
        self.below.entity(id)
    }

    fn entity_ids(&self) -> BTreeSet<EntityId> {
        let mut ids = self.below.entity_ids();
        for (id, entry) in self.diff.iter() {
            match entry {
                Some(_) => {
                    ids.insert(id.clone());
                }
                None => {
                    ids.remove(id);
                }
            }
        }
        ids
    }
}

impl StoreWrite for LayerWriter<'_> {
    fn set_field(&mut self, id: &EntityId, key: FieldKey, value: StoreValue) -> bool {
        if self.field(id, &key) == Some(&value) {
            return false;
        }
        let mut entity = self.entity(id).cloned().unwrap_or_default();
        entity.set(key, value);
        self.diff.insert(id.clone(), Some(entity));
        true
    }

    fn replace_entity(&mut self, id: EntityId, data: EntityData) -> bool {
        if self.entity(&id) == Some(&data) {
            return false;
        }
        self.diff.insert(id, Some(data));
        true
    }

    fn remove_entity(&mut self, id: &EntityId) -> bool {
        let present = self.entity(id).is_some();
        if present {
            self.diff.insert(id.clone(), None);
        }
        present
    }
}

/// Scratch target for fragment writes: everything lands in a private diff
/// that is either merged into the underlying target or discarded.
pub(crate) struct StagedWriter<'a> {
    inner: &'a mut dyn StoreWrite,
    diff: LayerDiff,
}

impl<'a> StagedWriter<'a> {
    pub(crate) fn new(inner: &'a mut dyn StoreWrite) -> Self {
        Self {
            inner,
            diff: LayerDiff::new(),
        }
    }

    /// Apply the staged diff to the underlying target.
    pub(crate) fn commit(self) {
        for (id, entry) in self.diff {
            match entry {
                Some(data) => {
                    self.inner.replace_entity(id, data);
                }
                None => {
                    self.inner.remove_entity(&id);
                }
            }
        }
    }
}

impl StoreView for StagedWriter<'_> {
    fn entity(&self, id: &EntityId) -> Option<&EntityData> {
        if let Some(entry) = self.diff.get(id) {
            return entry.as_ref();
        }
        self.inner.entity(id)
    }

    fn entity_ids(&self) -> BTreeSet<EntityId> {
        let mut ids = self.inner.entity_ids();
        for (id, entry) in self.diff.iter() {
            match entry {
                Some(_) => {
                    ids.insert(id.clone());
                }
                None => {
                    ids.remove(id);
                }
            }
        }
        ids
    }
}

impl StoreWrite for StagedWriter<'_> {
    fn set_field(&mut self, id: &EntityId, key: FieldKey, value: StoreValue) -> bool {
        if self.field(id, &key) == Some(&value) {
            return false;
        }
        let mut entity = self.entity(id).cloned().unwrap_or_default();
        entity.set(key, value);
        self.diff.insert(id.clone(), Some(entity));
        true
    }

    fn replace_entity(&mut self, id: EntityId, data: EntityData) -> bool {
        if self.entity(&id) == Some(&data) {
            return false;
        }
        self.diff.insert(id, Some(data));
        true
    }

    fn remove_entity(&mut self, id: &EntityId) -> bool {
        let present = self.entity(id).is_some();
        if present {
            self.diff.insert(id.clone(), None);
        }
        present
    }
}
