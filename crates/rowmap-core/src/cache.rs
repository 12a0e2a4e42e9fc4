//! Structural-identity cache for compiled materializers and binders.
//!
//! Each [`Identity`] owns one [`CacheSlot`]. A slot holds at most one
//! materializer (tagged with the shape hash it was built for) and one binder.
//! Both are published with an atomic swap and never mutated afterwards, so a
//! reader either sees the previous artifact or the new one, never a partial
//! one. Concurrent first lookups may compile the same artifact twice; the
//! last store wins and both results are equivalent.
//!
//! # Eviction
//!
//! Every publish bumps a global counter. Each time it reaches a multiple of
//! the configured interval, slots whose hit counter is at or below the floor
//! are removed. The slot that triggered the sweep is kept. Callers holding a
//! slot or an artifact keep using it; removal only drops the map entry.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use crate::bind::{CompiledBinder, ToParams};
use crate::error::MapError;
use crate::identity::Identity;
use crate::materialize::{CompileContext, CompiledMaterializer, FromRow};
use crate::options::MapperOptions;
use crate::shape::{ColumnShape, ShapeHash};

struct Artifact {
    shape_hash: Option<ShapeHash>,
    value: Arc<dyn Any + Send + Sync>,
}

/// Compiled artifacts for one identity.
#[derive(Default)]
pub struct CacheSlot {
    materializer: ArcSwapOption<Artifact>,
    binder: ArcSwapOption<Artifact>,
    hits: AtomicU64,
}

impl CacheSlot {
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Shape hash of the stored materializer, if any.
    pub fn shape_hash(&self) -> Option<ShapeHash> {
        self.materializer.load_full().and_then(|a| a.shape_hash)
    }
}

/// Concurrent map from [`Identity`] to [`CacheSlot`].
pub struct QueryCache {
    slots: DashMap<Identity, Arc<CacheSlot>>,
    publishes: AtomicUsize,
    sweep_every: usize,
    hit_floor: u64,
}

impl QueryCache {
    /// `sweep_every == 0` disables sweeping.
    pub fn new(sweep_every: usize, hit_floor: u64) -> Self {
        QueryCache {
            slots: DashMap::new(),
            publishes: AtomicUsize::new(0),
            sweep_every,
            hit_floor,
        }
    }

    pub fn from_options(options: &MapperOptions) -> Self {
        QueryCache::new(options.sweep_every_insertions, options.eviction_hit_floor)
    }

    /// The slot for `identity`, created on first use. Every later lookup
    /// counts as one hit, so callers that need both a binder and a
    /// materializer for one execution look the slot up once.
    pub fn slot(&self, identity: &Identity) -> Arc<CacheSlot> {
        let existing = self.slots.get(identity).map(|slot| Arc::clone(slot.value()));
        if let Some(slot) = existing {
            let hits = slot.hits.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!("Cache hit #{} for {}", hits, identity);
            return slot;
        }
        Arc::clone(
            self.slots
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(CacheSlot::default()))
                .value(),
        )
    }

    /// Returns the stored materializer when it was built for `shape`,
    /// compiling and publishing a new one otherwise. Counts as one use of
    /// `identity`.
    pub fn get_or_compile_materializer<T: FromRow>(
        &self,
        identity: &Identity,
        ctx: &CompileContext<'_>,
        shape: &ColumnShape,
    ) -> Result<CompiledMaterializer<T>, MapError> {
        reject_empty_shape::<T>(shape)?;
        let slot = self.slot(identity);
        self.materializer_in(&slot, identity, ctx, shape)
    }

    /// Like [`get_or_compile_materializer`](Self::get_or_compile_materializer)
    /// on a slot the caller already looked up. Does not count a hit.
    pub fn materializer_in<T: FromRow>(
        &self,
        slot: &CacheSlot,
        identity: &Identity,
        ctx: &CompileContext<'_>,
        shape: &ColumnShape,
    ) -> Result<CompiledMaterializer<T>, MapError> {
        reject_empty_shape::<T>(shape)?;
        let hash = shape.hash();
        if let Some(stored) = slot.materializer.load_full() {
            match stored.shape_hash {
                Some(stored_hash) if stored_hash == hash => {
                    if let Some(found) = stored.value.downcast_ref::<CompiledMaterializer<T>>() {
                        return Ok(found.clone());
                    }
                }
                Some(stored_hash) => tracing::debug!(
                    "Shape changed for {} ({} -> {}), recompiling",
                    identity,
                    stored_hash,
                    hash
                ),
                None => {}
            }
        }

        let compiled = CompiledMaterializer::new(hash, T::compile(ctx, shape)?);
        slot.materializer.store(Some(Arc::new(Artifact {
            shape_hash: Some(hash),
            value: Arc::new(compiled.clone()),
        })));
        self.published(identity);
        Ok(compiled)
    }

    /// Returns the stored binder for `identity`, compiling it on first use.
    /// Counts as one use of `identity`.
    pub fn get_or_compile_binder<P: ToParams>(
        &self,
        identity: &Identity,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledBinder<P>, MapError> {
        let slot = self.slot(identity);
        self.binder_in(&slot, identity, ctx)
    }

    /// Binder lookup on a slot the caller already looked up. Does not count
    /// a hit.
    pub fn binder_in<P: ToParams>(
        &self,
        slot: &CacheSlot,
        identity: &Identity,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledBinder<P>, MapError> {
        if let Some(stored) = slot.binder.load_full() {
            if let Some(found) = stored.value.downcast_ref::<CompiledBinder<P>>() {
                return Ok(found.clone());
            }
        }

        let compiled = CompiledBinder::new(P::compile_binder(ctx, &identity.sql, identity.kind)?);
        slot.binder.store(Some(Arc::new(Artifact {
            shape_hash: None,
            value: Arc::new(compiled.clone()),
        })));
        self.published(identity);
        Ok(compiled)
    }

    fn published(&self, identity: &Identity) {
        let count = self.publishes.fetch_add(1, Ordering::AcqRel) + 1;
        if self.sweep_every > 0 && count % self.sweep_every == 0 {
            self.sweep_except(Some(identity));
        }
    }

    /// Removes every slot at or below the hit floor. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_except(None)
    }

    fn sweep_except(&self, keep: Option<&Identity>) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|key, slot| keep == Some(key) || slot.hit_count() > self.hit_floor);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            tracing::info!("Swept {} cold cache slot(s)", removed);
        }
        removed
    }

    /// Drops every slot whose identity names `id` as target or parameter type.
    pub fn purge_type(&self, id: TypeId) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, _| !key.references(id));
        let removed = before.saturating_sub(self.slots.len());
        tracing::debug!("Purged {} cache slot(s) for a re-registered type", removed);
        removed
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn hit_count(&self, identity: &Identity) -> Option<u64> {
        self.slots.get(identity).map(|slot| slot.hit_count())
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.slots.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn reject_empty_shape<T: FromRow>(shape: &ColumnShape) -> Result<(), MapError> {
    if shape.is_empty() && !T::accepts_empty_shape() {
        return Err(MapError::EmptyShape {
            type_name: std::any::type_name::<T>(),
        });
    }
    Ok(())
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::from_options(&MapperOptions::default())
    }
}
