//! Cache facade.
//!
//! Owns the base store, the optimistic layer stack, and the watcher
//! registry, and routes every public operation through the core write,
//! read, and rebase paths. All operations run on one logical executor;
//! watcher callbacks fire only after a public mutation has fully applied,
//! so no watcher ever observes a store mid-write.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::CacheConfig;
use crate::core::document::Document;
use crate::core::error::CacheError;
use crate::core::field_key::Variables;
use crate::core::identity::{EntityId, Identify, MutationId, TypenameId};
use crate::core::optimistic::{
    OptimisticLayer, OptimisticWriter, layer_diffs, shadowed_ids,
};
use crate::core::read::{ReadEnv, ReadResult, read_result};
use crate::core::snapshot::SerializedStore;
use crate::core::store::{
    EffectiveView, LayerDiff, LayerWriter, StagedWriter, StoreData, StoreView, StoreWrite,
};
use crate::core::watch::{
    WatchCallback, WatchHandle, WatchRegistry, WatchStatus, WatchSubscription, WatchUpdate,
    Watcher, channel_callback,
};
use crate::core::write::{WriteEnv, WriteOutcome, write_result};

/// Outcome of a fragment-rooted write.
#[derive(Clone, Debug, PartialEq)]
pub enum FragmentWrite {
    Written(WriteOutcome),
    /// The fragment referenced fields absent from the data; the store was
    /// left untouched.
    Abandoned,
}

/// Normalized result cache with optimistic overlays.
///
/// Every instance is independent: the watcher registry and layer stack
/// live behind the value, never in process globals, so multiple caches
/// can coexist in one process.
pub struct Cache {
    base: StoreData,
    layers: Vec<OptimisticLayer>,
    watchers: WatchRegistry,
    identifier: Arc<dyn Identify>,
    config: CacheConfig,
    in_batch: bool,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Cache with default config and `__typename + id` identity.
    pub fn new() -> Self {
        Self::with_identifier(CacheConfig::default(), TypenameId)
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_identifier(config, TypenameId)
    }

    pub fn with_identifier(config: CacheConfig, identifier: impl Identify + 'static) -> Self {
        Self {
            base: StoreData::new(),
            layers: Vec::new(),
            watchers: WatchRegistry::new(),
            identifier: Arc::new(identifier),
            config,
            in_batch: false,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Normalize a query result into the base store, starting at
    /// `ROOT_QUERY`.
    pub fn write(
        &mut self,
        document: &Document,
        result: &Value,
        variables: &Variables,
    ) -> crate::Result<WriteOutcome> {
        self.write_at(document, result, variables, &EntityId::root_query())
    }

    /// Normalize a result starting at an arbitrary entity id.
    pub fn write_at(
        &mut self,
        document: &Document,
        result: &Value,
        variables: &Variables,
        start: &EntityId,
    ) -> crate::Result<WriteOutcome> {
        let outcome = self.write_internal(document, result, variables, start)?;
        self.flush()?;
        Ok(outcome)
    }

    fn write_internal(
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
            identifier: self.identifier.as_ref(),
            limits: &self.config.limits,
        };
        let outcome = write_result(&mut self.base, &env, &document.selection_set, object, start)?;
        debug!(start = %start, changed = outcome.changed.len(), "write applied");
        self.watchers.mark_dirty(outcome.changed.iter().cloned());
        Ok(outcome)
    }

    /// Write data shaped by a single fragment at an arbitrary entity id.
    ///
    /// Fails soft: data missing fields the fragment names abandons the
    /// whole write and reports it, leaving the store untouched.
    pub fn write_fragment(
        &mut self,
        id: &EntityId,
        document: &Document,
        fragment_name: Option<&str>,
        data: &Value,
        variables: &Variables,
    ) -> crate::Result<FragmentWrite> {
        let fragment = document.fragment(fragment_name)?;
        let object = data.as_object().ok_or(CacheError::NonObjectResult)?;
        let env = WriteEnv {
            variables,
            fragments: &document.fragments,
            identifier: self.identifier.as_ref(),
            limits: &self.config.limits,
        };

        let mut staged = StagedWriter::new(&mut self.base);
        let outcome = write_result(&mut staged, &env, &fragment.selection_set, object, id)?;
        if !outcome.completion.is_complete() {
            debug!(id = %id, fragment = %fragment.name, "fragment write abandoned: partial data");
            return Ok(FragmentWrite::Abandoned);
        }
        staged.commit();

        self.watchers.mark_dirty(outcome.changed.iter().cloned());
        self.flush()?;
        Ok(FragmentWrite::Written(outcome))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read from `ROOT_QUERY` through the optimistic stack.
    pub fn read(&self, document: &Document, variables: &Variables) -> crate::Result<ReadResult> {
        self.read_at(document, variables, &EntityId::root_query())
    }

    pub fn read_at(
        &self,
        document: &Document,
        variables: &Variables,
        start: &EntityId,
    ) -> crate::Result<ReadResult> {
        let diffs = layer_diffs(&self.layers);
        let view = EffectiveView::new(&self.base, diffs);
        let env = ReadEnv {
            variables,
            fragments: &document.fragments,
            limits: &self.config.limits,
        };
        let (result, _touched) = read_result(&view, &env, &document.selection_set, start)?;
        Ok(result)
    }

    /// Read a single fragment's selection starting at an entity id.
    pub fn read_fragment(
        &self,
        id: &EntityId,
        document: &Document,
        fragment_name: Option<&str>,
        variables: &Variables,
    ) -> crate::Result<ReadResult> {
        let fragment = document.fragment(fragment_name)?;
        let diffs = layer_diffs(&self.layers);
        let view = EffectiveView::new(&self.base, diffs);
        let env = ReadEnv {
            variables,
            fragments: &document.fragments,
            limits: &self.config.limits,
        };
        let (result, _touched) = read_result(&view, &env, &fragment.selection_set, id)?;
        Ok(result)
    }

    // =========================================================================
    // Watch
    // =========================================================================

    /// Register a callback watcher.
    ///
    /// The registration read establishes the dependency set without firing
    /// the callback; afterwards the callback fires whenever a flush finds
    /// the watcher's result changed.
    pub fn watch<F>(
        &mut self,
        document: Document,
        variables: Variables,
        start: EntityId,
        mut callback: F,
    ) -> crate::Result<WatchHandle>
    where
        F: FnMut(WatchUpdate) + 'static,
    {
        let wrapped: WatchCallback = Box::new(move |update| {
            callback(update);
            WatchStatus::Active
        });
        self.register_watcher(Arc::new(document), variables, start, wrapped)
    }

    /// Register a channel-delivered watcher.
    pub fn subscribe(
        &mut self,
        document: Document,
        variables: Variables,
        start: EntityId,
    ) -> crate::Result<WatchSubscription> {
        let (callback, receiver) = channel_callback();
        let handle = self.register_watcher(Arc::new(document), variables, start, callback)?;
        Ok(WatchSubscription::new(handle, receiver))
    }

    pub fn unwatch(&mut self, handle: WatchHandle) -> bool {
        self.watchers.remove(handle.id)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn register_watcher(
        &mut self,
        document: Arc<Document>,
        variables: Variables,
        start: EntityId,
        callback: WatchCallback,
    ) -> crate::Result<WatchHandle> {
        let diffs = layer_diffs(&self.layers);
        let view = EffectiveView::new(&self.base, diffs);
        let env = ReadEnv {
            variables: &variables,
            fragments: &document.fragments,
            limits: &self.config.limits,
        };
        let (result, touched) = read_result(&view, &env, &document.selection_set, &start)?;

        let watcher = Watcher {
            document,
            variables,
            start,
            callback,
            touched,
            last: Some(result),
        };
        let handle = self
            .watchers
            .register(watcher, self.config.limits.max_watchers)?;
        debug!(watcher = %handle.id, "watcher registered");
        Ok(handle)
    }

    // =========================================================================
    // Optimistic layers
    // =========================================================================

    /// Record an optimistic layer tagged with `mutation_id`.
    ///
    /// The closure writes against the effective store (base plus the
    /// layers recorded so far) and is retained: removing a layer beneath
    /// this one replays the closure against the rebased view. It must be
    /// a pure function of what it reads - a replay that observes a
    /// different base may legitimately compute different values, and the
    /// stack makes no attempt to reconcile that.
    pub fn record_optimistic<F>(
        &mut self,
        mutation_id: impl Into<String>,
        write_fn: F,
    ) -> crate::Result<()>
    where
        F: Fn(&mut OptimisticWriter<'_>) -> crate::Result<()> + 'static,
    {
        let mutation = MutationId::new(mutation_id)?;
        if self.layers.len() >= self.config.limits.max_optimistic_layers {
            return Err(CacheError::LayerLimit {
                max_layers: self.config.limits.max_optimistic_layers,
            }
            .into());
        }
        if self.layers.iter().any(|layer| layer.mutation == mutation) {
            return Err(CacheError::DuplicateMutation {
                mutation: mutation.to_string(),
            }
            .into());
        }

        let replay: Box<dyn Fn(&mut OptimisticWriter<'_>) -> crate::Result<()>> =
            Box::new(write_fn);
        let mut diff = LayerDiff::new();
        let mut changed = BTreeSet::new();
        {
            let below = EffectiveView::new(&self.base, layer_diffs(&self.layers));
            let mut writer = OptimisticWriter::new(
                LayerWriter::new(below, &mut diff),
                self.identifier.as_ref(),
                &self.config.limits,
                &mut changed,
            );
            replay(&mut writer)?;
        }

        debug!(mutation = %mutation, entities = diff.len(), "optimistic layer recorded");
        self.layers.push(OptimisticLayer {
            mutation,
            diff,
            replay,
        });
        self.watchers.mark_dirty(changed);
        self.flush()
    }

    /// Drop the layer tagged `mutation_id` and rebase the layers above it
    /// by replaying their closures in original push order.
    pub fn remove_optimistic(&mut self, mutation_id: impl Into<String>) -> crate::Result<()> {
        let mutation = MutationId::new(mutation_id)?;
        let mut dirty = BTreeSet::new();
        self.remove_layer(&mutation, &mut dirty)?;
        self.watchers.mark_dirty(dirty);
        self.flush()
    }

    /// Absorb the authoritative result into the base store, then drop the
    /// optimistic layer, in one notification window.
    pub fn commit_optimistic(
        &mut self,
        mutation_id: impl Into<String>,
        document: &Document,
        result: &Value,
        variables: &Variables,
    ) -> crate::Result<WriteOutcome> {
        let mutation = MutationId::new(mutation_id)?;
        if !self.layers.iter().any(|layer| layer.mutation == mutation) {
            return Err(CacheError::UnknownMutation {
                mutation: mutation.to_string(),
            }
            .into());
        }

        let outcome =
            self.write_internal(document, result, variables, &EntityId::root_query())?;
        let mut dirty = BTreeSet::new();
        self.remove_layer(&mutation, &mut dirty)?;
        self.watchers.mark_dirty(dirty);
        self.flush()?;
        Ok(outcome)
    }

    fn remove_layer(
        &mut self,
        mutation: &MutationId,
        dirty: &mut BTreeSet<EntityId>,
    ) -> crate::Result<()> {
        let Some(index) = self
            .layers
            .iter()
            .position(|layer| &layer.mutation == mutation)
        else {
            return Err(CacheError::UnknownMutation {
                mutation: mutation.to_string(),
            }
            .into());
        };

        let removed = self.layers.remove(index);
        dirty.extend(shadowed_ids(&removed).cloned());

        // Rebase: replay every layer above the removed one, in original
        // order, against the new effective base. A replayed closure sees a
        // different store and may write different values; a failing replay
        // aborts the rebase and drops the layers not yet replayed.
        let above = self.layers.split_off(index);
        let rebased = above.len();
        for layer in above {
            dirty.extend(shadowed_ids(&layer).cloned());
            let mut diff = LayerDiff::new();
            let mut changed = BTreeSet::new();
            {
                let below = EffectiveView::new(&self.base, layer_diffs(&self.layers));
                let mut writer = OptimisticWriter::new(
                    LayerWriter::new(below, &mut diff),
                    self.identifier.as_ref(),
                    &self.config.limits,
                    &mut changed,
                );
                (layer.replay)(&mut writer)?;
            }
            dirty.extend(changed);
            self.layers.push(OptimisticLayer {
                mutation: layer.mutation,
                diff,
                replay: layer.replay,
            });
        }

        debug!(mutation = %mutation, rebased, "optimistic layer removed");
        Ok(())
    }

    // =========================================================================
    // Batch and notification
    // =========================================================================

    /// Run several mutations with a single notification flush at the end.
    pub fn batch<T, F>(&mut self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut Cache) -> crate::Result<T>,
    {
        let prev = self.in_batch;
        self.in_batch = true;
        let result = f(self);
        self.in_batch = prev;
        let flushed = self.flush();
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Re-read dirty watchers and fire callbacks whose results changed.
    /// Deferred while inside `batch`.
    fn flush(&mut self) -> crate::Result<()> {
        if self.in_batch || !self.watchers.has_pending() {
            return Ok(());
        }

        let pending = self.watchers.take_pending();
        let dirty = self.watchers.intersecting(&pending);
        debug!(
            written = pending.len(),
            watchers = dirty.len(),
            "flushing notifications"
        );

        let mut closed = Vec::new();
        for id in dirty {
            let diffs = layer_diffs(&self.layers);
            let view = EffectiveView::new(&self.base, diffs);
            let Some(watcher) = self.watchers.get_mut(id) else {
                continue;
            };
            let env = ReadEnv {
                variables: &watcher.variables,
                fragments: &watcher.document.fragments,
                limits: &self.config.limits,
            };
            match read_result(&view, &env, &watcher.document.selection_set, &watcher.start) {
                Ok((result, touched)) => {
                    watcher.touched = touched;
                    if watcher.last.as_ref() != Some(&result) {
                        let update = WatchUpdate::from_result(&result);
                        watcher.last = Some(result);
                        if (watcher.callback)(update) == WatchStatus::Closed {
                            closed.push(id);
                        }
                    }
                }
                Err(error) => {
                    debug!(watcher = %id, %error, "watcher re-read failed; dropping watcher");
                    closed.push(id);
                }
            }
        }

        for id in closed {
            self.watchers.remove(id);
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle and snapshots
    // =========================================================================

    /// Serialize the store: the base alone, or the effective view with
    /// optimistic layers applied.
    pub fn extract(&self, include_optimistic: bool) -> SerializedStore {
        if include_optimistic {
            let diffs = layer_diffs(&self.layers);
            SerializedStore::from_view(&EffectiveView::new(&self.base, diffs))
        } else {
            SerializedStore::from_view(&self.base)
        }
    }

    /// Replace the base store from a snapshot. Optimistic layers are
    /// dropped; every watcher re-reads.
    pub fn restore(&mut self, snapshot: SerializedStore) -> crate::Result<()> {
        let store = snapshot.into_store(&self.config.limits)?;

        let mut dirty =
            EffectiveView::new(&self.base, layer_diffs(&self.layers)).entity_ids();
        self.base = store;
        self.layers.clear();
        dirty.extend(self.base.entity_ids());

        self.watchers.mark_dirty(dirty);
        self.flush()
    }

    /// Drop every entity and every optimistic layer. Watchers stay
    /// registered and observe the empty store.
    pub fn reset(&mut self) -> crate::Result<()> {
        let dirty = EffectiveView::new(&self.base, layer_diffs(&self.layers)).entity_ids();
        self.base.clear();
        self.layers.clear();
        self.watchers.mark_dirty(dirty);
        self.flush()
    }

    /// Explicitly remove one entity from the base store and every layer.
    /// References to it become dangling and read back as missing.
    pub fn evict(&mut self, id: &EntityId) -> crate::Result<bool> {
        let mut removed = self.base.remove_entity(id);
        for layer in &mut self.layers {
            removed |= layer.diff.remove(id).is_some();
        }
        if removed {
            self.watchers.mark_dirty([id.clone()]);
            self.flush()?;
        }
        Ok(removed)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether the effective store holds an entity under this id.
    pub fn contains(&self, id: &EntityId) -> bool {
        EffectiveView::new(&self.base, layer_diffs(&self.layers))
            .entity(id)
            .is_some()
    }

    /// Number of entities in the effective store.
    pub fn entity_count(&self) -> usize {
        EffectiveView::new(&self.base, layer_diffs(&self.layers))
            .entity_ids()
            .len()
    }

    /// Number of live optimistic layers.
    pub fn optimistic_layer_count(&self) -> usize {
        self.layers.len()
    }
}
