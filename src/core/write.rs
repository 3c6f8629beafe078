//! Normalizer: shred a query-shaped result tree into flat entity writes.
//!
//! The walk pairs each selection with the result value under its response
//! key (alias or name). Child objects are written first under their own
//! id, then the parent slot is pointed at them; overwriting a generated
//! reference with a different id triggers identity reconciliation.
//!
//! A field the selection names but the result tree lacks is not an error:
//! it degrades the write to `Completion::Partial`. Fragment sub-writes are
//! staged so a partial fragment discards its writes while surrounding
//! writes proceed.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::trace;

use super::document::{Field, FragmentDefinition, Selection, SelectionSet};
use super::error::CacheError;
use super::field_key::{FieldKey, Variables, field_key};
use super::identity::{EntityId, Identify};
use super::limits::Limits;
use super::reconcile::reconcile;
use super::store::{StagedWriter, StoreWrite};
use super::value::{EntityRef, ListItem, StoreValue};

/// Whether a write covered every field its selection named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Completion {
    #[default]
    Complete,
    Partial,
}

impl Completion {
    pub fn merge(self, other: Completion) -> Completion {
        match (self, other) {
            (Completion::Complete, Completion::Complete) => Completion::Complete,
            _ => Completion::Partial,
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Completion::Complete)
    }
}

/// What a write did: which entities changed, and whether the selection was
/// fully covered. Identical rewrites leave `changed` empty (and watchers
/// silent).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteOutcome {
    pub changed: BTreeSet<EntityId>,
    pub completion: Completion,
}

/// Write environment: everything the walk needs besides the target.
pub(crate) struct WriteEnv<'a> {
    pub variables: &'a Variables,
    pub fragments: &'a BTreeMap<String, FragmentDefinition>,
    pub identifier: &'a dyn Identify,
    pub limits: &'a Limits,
}

pub(crate) fn write_result(
    target: &mut dyn StoreWrite,
    env: &WriteEnv<'_>,
    selection_set: &SelectionSet,
    result: &Map<String, Value>,
    start: &EntityId,
) -> Result<WriteOutcome, CacheError> {
    let mut writer = Writer {
        env,
        changed: BTreeSet::new(),
        spread_stack: Vec::new(),
    };
    let completion = writer.write_selection_set(target, selection_set, result, start, 0)?;
    Ok(WriteOutcome {
        changed: writer.changed,
        completion,
    })
}

struct Writer<'a> {
    env: &'a WriteEnv<'a>,
    changed: BTreeSet<EntityId>,
    spread_stack: Vec<String>,
}

impl<'a> Writer<'a> {
    fn write_selection_set(
        &mut self,
        target: &mut dyn StoreWrite,
        selection_set: &SelectionSet,
        result: &Map<String, Value>,
        id: &EntityId,
        depth: usize,
    ) -> Result<Completion, CacheError> {
        if depth > self.env.limits.max_selection_depth {
            return Err(CacheError::DepthExceeded {
                limit: self.env.limits.max_selection_depth,
            });
        }

        let mut completion = Completion::Complete;
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let Some(value) = result.get(field.response_key()) else {
                        trace!(id = %id, field = field.response_key(), "field absent from result tree");
                        completion = Completion::Partial;
                        continue;
                    };
                    completion =
                        completion.merge(self.write_field(target, field, value, id, depth)?);
                }
                Selection::InlineFragment(fragment) => {
                    completion = completion.merge(self.write_staged(
                        target,
                        &fragment.selection_set,
                        result,
                        id,
                        depth,
                    )?);
                }
                Selection::FragmentSpread(spread) => {
                    let fragment = self.enter_spread(&spread.name)?;
                    let staged =
                        self.write_staged(target, &fragment.selection_set, result, id, depth);
                    self.spread_stack.pop();
                    completion = completion.merge(staged?);
                }
            }
        }
        Ok(completion)
    }

    /// Run a fragment's selections against a scratch diff. A complete
    /// sub-write is merged into the target; a partial one is discarded so
    /// the fragment leaves no half-written entities behind.
    fn write_staged(
        &mut self,
        target: &mut dyn StoreWrite,
        selection_set: &SelectionSet,
        result: &Map<String, Value>,
        id: &EntityId,
        depth: usize,
    ) -> Result<Completion, CacheError> {
        let changed_before = self.changed.clone();
        let mut staged = StagedWriter::new(target);
        let completion = self.write_selection_set(&mut staged, selection_set, result, id, depth)?;
        if completion.is_complete() {
            staged.commit();
        } else {
            drop(staged);
            self.changed = changed_before;
        }
        Ok(completion)
    }

    fn write_field(
        &mut self,
        target: &mut dyn StoreWrite,
        field: &Field,
        value: &Value,
        id: &EntityId,
        depth: usize,
    ) -> Result<Completion, CacheError> {
        let key = field_key(field, self.env.variables)?;

        let Some(selection_set) = &field.selection_set else {
            let stored = if is_opaque(value) {
                StoreValue::Json(value.clone())
            } else {
                StoreValue::Scalar(value.clone())
            };
            self.set(target, id, key, stored);
            return Ok(Completion::Complete);
        };

        match value {
            Value::Null => {
                self.set(target, id, key, StoreValue::Scalar(Value::Null));
                Ok(Completion::Complete)
            }
            Value::Array(items) => {
                let previous = match target.field(id, &key) {
                    Some(StoreValue::RefList(prior)) => Some(prior.clone()),
                    _ => None,
                };
                let mut indices = Vec::new();
                let (list, completion) = self.write_list(
                    target,
                    selection_set,
                    items,
                    id,
                    &key,
                    previous.as_deref(),
                    &mut indices,
                    depth,
                )?;
                self.set(target, id, key, StoreValue::RefList(list));
                Ok(completion)
            }
            Value::Object(object) => {
                let child_id = match self.identify(object)? {
                    Some(child_id) => child_id,
                    None => EntityId::synthetic_child(id, &key),
                };

                let existing = target.field(id, &key).cloned();
                if let Some(StoreValue::Ref(old)) = &existing
                    && !old.generated
                    && child_id.is_synthetic()
                {
                    return Err(CacheError::IdentityOverwrite {
                        id: id.to_string(),
                        field: key.to_string(),
                        existing: old.id.to_string(),
                    });
                }

                let completion =
                    self.write_selection_set(target, selection_set, object, &child_id, depth + 1)?;

                if let Some(StoreValue::Ref(old)) = existing
                    && old.generated
                    && old.id != child_id
                {
                    reconcile(target, &old.id, &child_id, &mut self.changed);
                }

                self.set(target, id, key, StoreValue::Ref(EntityRef::new(child_id)));
                Ok(completion)
            }
            _ => {
                // composite selection over a scalar value: shape mismatch,
                // surfaces as a missing field on read-back
                trace!(id = %id, field = %key, "scalar result under composite selection");
                Ok(Completion::Partial)
            }
        }
    }

    /// `previous` is the list the slot held before this write, position by
    /// position, so elements get the same identity rules as scalar
    /// reference slots.
    fn write_list(
        &mut self,
        target: &mut dyn StoreWrite,
        selection_set: &SelectionSet,
        items: &[Value],
        parent: &EntityId,
        key: &FieldKey,
        previous: Option<&[ListItem]>,
        indices: &mut Vec<usize>,
        depth: usize,
    ) -> Result<(Vec<ListItem>, Completion), CacheError> {
        let mut completion = Completion::Complete;
        let mut out = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            indices.push(index);
            let prior = previous.and_then(|prior_items| prior_items.get(index));
            match item {
                Value::Null => out.push(ListItem::Null),
                Value::Array(inner) => {
                    let prior_inner = match prior {
                        Some(ListItem::List(inner)) => Some(inner.as_slice()),
                        _ => None,
                    };
                    let (list, inner_completion) = self.write_list(
                        target,
                        selection_set,
                        inner,
                        parent,
                        key,
                        prior_inner,
                        indices,
                        depth,
                    )?;
                    completion = completion.merge(inner_completion);
                    out.push(ListItem::List(list));
                }
                Value::Object(object) => {
                    let child_id = match self.identify(object)? {
                        Some(child_id) => child_id,
                        None => EntityId::synthetic_element(parent, key, indices),
                    };

                    if let Some(ListItem::Ref(old)) = prior
                        && !old.generated
                        && child_id.is_synthetic()
                    {
                        return Err(CacheError::IdentityOverwrite {
                            id: parent.to_string(),
                            field: key.to_string(),
                            existing: old.id.to_string(),
                        });
                    }

                    completion = completion.merge(self.write_selection_set(
                        target,
                        selection_set,
                        object,
                        &child_id,
                        depth + 1,
                    )?);

                    if let Some(ListItem::Ref(old)) = prior
                        && old.generated
                        && old.id != child_id
                    {
                        reconcile(target, &old.id, &child_id, &mut self.changed);
                    }

                    out.push(ListItem::Ref(EntityRef::new(child_id)));
                }
                _ => {
                    completion = Completion::Partial;
                    out.push(ListItem::Null);
                }
            }
            indices.pop();
        }

        Ok((out, completion))
    }

    fn set(&mut self, target: &mut dyn StoreWrite, id: &EntityId, key: FieldKey, value: StoreValue) {
        if target.set_field(id, key, value) {
            self.changed.insert(id.clone());
        }
    }

    fn identify(&self, object: &Map<String, Value>) -> Result<Option<EntityId>, CacheError> {
        match self.env.identifier.identify(object) {
            Some(raw) if raw.starts_with('$') => Err(CacheError::IdentityViolation { id: raw }),
            Some(raw) => EntityId::user(raw).map(Some),
            None => Ok(None),
        }
    }

    fn enter_spread(&mut self, name: &str) -> Result<&'a FragmentDefinition, CacheError> {
        if self.spread_stack.iter().any(|active| active == name) {
            return Err(CacheError::FragmentCycle {
                name: name.to_string(),
            });
        }
        if self.spread_stack.len() >= self.env.limits.max_fragment_depth {
            return Err(CacheError::DepthExceeded {
                limit: self.env.limits.max_fragment_depth,
            });
        }
        let fragment =
            self.env
                .fragments
                .get(name)
                .ok_or_else(|| CacheError::MissingFragment {
                    name: name.to_string(),
                })?;
        self.spread_stack.push(name.to_string());
        Ok(fragment)
    }
}

/// A selection-less field value is opaque when it contains objects
/// anywhere; plain scalars and scalar arrays stay inline.
fn is_opaque(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(is_opaque),
        _ => false,
    }
}
