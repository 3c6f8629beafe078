//! Identity reconciliation: absorb a synthetic-id entity into a real one.
//!
//! Invoked by the writer when a slot holding a generated reference is
//! about to point at a different id. After reconciliation the synthetic
//! entity is gone, its fields live on the real entity (the real entity
//! wins collisions), and every reference to the synthetic id anywhere in
//! the effective store has been redirected.

use std::collections::BTreeSet;

use tracing::debug;

use super::field_key::FieldKey;
use super::identity::EntityId;
use super::store::StoreWrite;
use super::value::StoreValue;

pub(crate) fn reconcile(
    target: &mut dyn StoreWrite,
    synthetic: &EntityId,
    real: &EntityId,
    changed: &mut BTreeSet<EntityId>,
) {
    debug_assert!(synthetic != real, "reconcile requires distinct ids");

    let Some(generated_entity) = target.entity(synthetic).cloned() else {
        return;
    };
    debug!(synthetic = %synthetic, real = %real, "absorbing synthetic entity");

    // Pair nested generated references with the real tree's references
    // and merge those sub-trees first.
    let real_snapshot = target.entity(real).cloned().unwrap_or_default();
    for (key, generated_value) in generated_entity.iter() {
        if let StoreValue::Ref(generated_ref) = generated_value
            && generated_ref.generated
            && let Some(StoreValue::Ref(real_ref)) = real_snapshot.get(key)
            && real_ref.id != generated_ref.id
        {
            let from = generated_ref.id.clone();
            let to = real_ref.id.clone();
            reconcile(target, &from, &to, changed);
        }
    }

    // Shallow merge: start from the synthetic entity's fields, overlay the
    // real entity's (the real id wins collisions). Re-read the synthetic
    // entity: nested merges may have redirected its reference fields.
    let mut merged = target.entity(synthetic).cloned().unwrap_or(generated_entity);
    if let Some(real_entity) = target.entity(real) {
        let overlay: Vec<(FieldKey, StoreValue)> = real_entity
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in overlay {
            merged.set(key, value);
        }
    }
    if target.replace_entity(real.clone(), merged) {
        changed.insert(real.clone());
    }

    if target.remove_entity(synthetic) {
        changed.insert(synthetic.clone());
    }

    rewrite_references(target, synthetic, real, changed);
}

/// Redirect every reference to `from` anywhere in the effective store.
fn rewrite_references(
    target: &mut dyn StoreWrite,
    from: &EntityId,
    to: &EntityId,
    changed: &mut BTreeSet<EntityId>,
) {
    for id in target.entity_ids() {
        let Some(entity) = target.entity(&id) else {
            continue;
        };
        let rewrites: Vec<(FieldKey, StoreValue)> = entity
            .iter()
            .filter_map(|(key, value)| {
                value
                    .rewritten(from, to)
                    .map(|rewritten| (key.clone(), rewritten))
            })
            .collect();
        for (key, value) in rewrites {
            if target.set_field(&id, key, value) {
                changed.insert(id.clone());
            }
        }
    }
}
