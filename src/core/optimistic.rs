//! Optimistic overlay layers.
//!
//! Each layer is a mutation-tagged diff over the effective store plus the
//! closure that produced it. The closure is kept because removing a lower
//! layer replays every layer above it, in original push order, against the
//! rebased view - so closures must be pure functions of what they read.
//!
//! The rebase is deliberately not commutative: removing a middle layer and
//! replaying the ones above can yield a store that differs from one where
//! the middle layer never existed, because replayed closures observe a
//! different base.

use std::collections::BTreeSet;

use serde_json::Value;

use super::document::Document;
use super::error::CacheError;
use super::field_key::Variables;
use super::identity::{EntityId, Identify, MutationId};
use super::limits::Limits;
use super::read::{ReadEnv, ReadResult, read_result};
use super::store::{LayerDiff, LayerWriter};
use super::write::{WriteEnv, WriteOutcome, write_result};

/// Closure recorded with a layer, re-run on rebase.
pub type OptimisticWriteFn = Box<dyn Fn(&mut OptimisticWriter<'_>) -> crate::Result<()>>;

pub(crate) struct OptimisticLayer {
    pub(crate) mutation: MutationId,
    pub(crate) diff: LayerDiff,
    pub(crate) replay: OptimisticWriteFn,
}

/// Write surface handed to an optimistic closure.
///
/// Reads see the stack recorded so far plus this layer's own writes;
/// writes land in this layer only.
pub struct OptimisticWriter<'a> {
    target: LayerWriter<'a>,
    identifier: &'a dyn Identify,
    limits: &'a Limits,
    changed: &'a mut BTreeSet<EntityId>,
}

impl<'a> OptimisticWriter<'a> {
    pub(crate) fn new(
        target: LayerWriter<'a>,
        identifier: &'a dyn Identify,
        limits: &'a Limits,
        changed: &'a mut BTreeSet<EntityId>,
    ) -> Self {
        Self {
            target,
            identifier,
            limits,
            changed,
        }
    }

    pub fn write(
        &mut self,
        document: &Document,
        result: &Value,
        variables: &Variables,
    ) -> crate::Result<WriteOutcome> {
        self.write_at(document, result, variables, &EntityId::root_query())
    }

    pub fn write_at(
        &mut self,
        document: &Document,
        result: &Value,
        variables: &Variables,
        start: &EntityId,
    ) -> crate::Result<WriteOutcome> {
        let object = result.as_object().ok_or(CacheError::NonObjectResult)?;
        let env = WriteEnv {
            variables,
            fragments: &document.fragments,
            identifier: self.identifier,
            limits: self.limits,
        };
        let outcome = write_result(
            &mut self.target,
            &env,
            &document.selection_set,
            object,
            start,
        )?;
        self.changed.extend(outcome.changed.iter().cloned());
        Ok(outcome)
    }

    pub fn read(&self, document: &Document, variables: &Variables) -> crate::Result<ReadResult> {
        self.read_at(document, variables, &EntityId::root_query())
    }

    pub fn read_at(
        &self,
        document: &Document,
        variables: &Variables,
        start: &EntityId,
    ) -> crate::Result<ReadResult> {
        let env = ReadEnv {
            variables,
            fragments: &document.fragments,
            limits: self.limits,
        };
        let (result, _touched) =
            read_result(&self.target, &env, &document.selection_set, start)?;
        Ok(result)
    }
}

/// Borrow each layer's diff in stack order, for building effective views.
pub(crate) fn layer_diffs(layers: &[OptimisticLayer]) -> Vec<&LayerDiff> {
    layers.iter().map(|layer| &layer.diff).collect()
}

/// Ids a layer's diff shadows; these become dirty when the layer goes away.
pub(crate) fn shadowed_ids(layer: &OptimisticLayer) -> impl Iterator<Item = &EntityId> {
    layer.diff.keys()
}
