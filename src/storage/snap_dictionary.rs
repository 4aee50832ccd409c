//! Single-map form of the generational engine.
//!
//! [`SnapDictionary`] pairs one [`GenMap`] with its own generation clock and
//! collector. The content store composes several maps over one clock; this
//! type is the engine on its own, for callers that only need a snapshot
//! isolated key/value cache.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::primitives::concurrency::{GenRef, GenerationClock, GenerationStatus, WriteGuard};
use crate::types::{Generation, Result};

use super::collector::{issue_snapshot, Collect, CollectStats, Collector};
use super::gen_map::GenMap;
use super::metrics::{default_metrics, StoreMetrics};
use super::options::StoreOptions;

struct DictInner<K, V> {
    clock: GenerationClock,
    items: GenMap<K, V>,
    collector: Collector,
    options: StoreOptions,
    metrics: Arc<dyn StoreMetrics>,
}

impl<K, V> Collect for DictInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clock(&self) -> &GenerationClock {
        &self.clock
    }

    fn collector(&self) -> &Collector {
        &self.collector
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn metrics(&self) -> &dyn StoreMetrics {
        self.metrics.as_ref()
    }

    fn prune_below(&self, floor: Generation, stats: &mut CollectStats) {
        self.items.prune(&self.clock, floor, stats);
    }
}

/// Snapshot-isolated concurrent dictionary with a single writer.
///
/// Cloning is cheap and yields another handle to the same dictionary.
pub struct SnapDictionary<K, V> {
    inner: Arc<DictInner<K, V>>,
}

impl<K, V> Clone for SnapDictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for SnapDictionary<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapDictionary")
            .field("status", &self.inner.clock.status())
            .field("keys", &self.inner.items.len())
            .finish()
    }
}

impl<K, V> SnapDictionary<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty dictionary with default options.
    pub fn new() -> Self {
        Self::build(StoreOptions::default())
    }

    /// Creates an empty dictionary with the given options.
    pub fn with_options(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: StoreOptions) -> Self {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Self {
            inner: Arc::new(DictInner {
                clock: GenerationClock::new(),
                items: GenMap::new("items"),
                collector: Collector::new(),
                options,
                metrics,
            }),
        }
    }

    /// Enters the write lock.
    ///
    /// Blocks while another writer holds it. Snapshots created while the
    /// writer is alive do not observe its changes.
    pub fn write(&self) -> DictWriter<'_, K, V> {
        DictWriter {
            guard: self.inner.clock.write(),
            items: &self.inner.items,
        }
    }

    /// Runs `action` inside the write lock.
    pub fn write_locked<R>(&self, action: impl FnOnce(&DictWriter<'_, K, V>) -> R) -> R {
        let writer = self.write();
        action(&writer)
    }

    /// Returns a read view pinned to the newest complete generation.
    pub fn create_snapshot(&self) -> DictSnapshot<K, V> {
        let reference = issue_snapshot(&self.inner);
        DictSnapshot {
            reference,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Value of `key` at an arbitrary generation.
    ///
    /// Generations below the floor may already have been pruned.
    pub fn get_at<Q>(&self, key: &Q, generation: Generation) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.get(key, generation)
    }

    /// Keys visible at `generation`, in no particular order.
    pub fn keys_at(&self, generation: Generation) -> Vec<K> {
        self.inner
            .items
            .entries_at(generation)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// Values visible at `generation`, in no particular order.
    pub fn values_at(&self, generation: Generation) -> Vec<V> {
        self.inner
            .items
            .entries_at(generation)
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Number of keys, including tombstones not yet collected.
    pub fn count(&self) -> usize {
        self.inner.items.len()
    }

    /// Number of issued snapshots not yet dequeued by the collector.
    pub fn snapshot_count(&self) -> usize {
        self.inner.clock.status().queued_snapshots
    }

    /// Live and floor generations.
    pub fn generations(&self) -> GenerationStatus {
        self.inner.clock.status()
    }

    /// Generations retained in the chain of `key`, newest first.
    pub fn key_generations<Q>(&self, key: &Q) -> Vec<Generation>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.generations(key)
    }

    /// Starts a background collection unless one is already running.
    pub fn collect(&self) -> bool {
        self.inner.collector.spawn(Arc::clone(&self.inner))
    }

    /// Blocks until no collection is running.
    pub fn wait_for_pending_collection(&self) {
        self.inner.collector.wait();
    }

    /// Runs a collection pass on the calling thread.
    pub fn collect_now(&self) -> CollectStats {
        self.inner.collector.run_now(self.inner.as_ref())
    }

    /// Statistics of the last finished pass.
    pub fn last_collect_stats(&self) -> Option<CollectStats> {
        self.inner.collector.last_stats()
    }

    /// Number of finished passes.
    pub fn collection_passes(&self) -> u64 {
        self.inner.collector.passes()
    }
}

impl<K, V> Default for SnapDictionary<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to a [`SnapDictionary`], held for the duration of a write.
pub struct DictWriter<'a, K, V> {
    guard: WriteGuard<'a>,
    items: &'a GenMap<K, V>,
}

impl<'a, K, V> DictWriter<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Live generation of this write.
    pub fn generation(&self) -> Generation {
        self.guard.generation()
    }

    /// Current value, including writes made under this guard.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.get_live(&self.guard, key)
    }

    /// Sets `key` to `value` in the live generation.
    pub fn set(&self, key: K, value: V) {
        self.items.set(&self.guard, key, value);
    }

    /// Clears `key` in the live generation.
    pub fn clear<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.clear(&self.guard, key);
    }

    /// Clears every key.
    pub fn clear_all(&self) {
        self.items.clear_all(&self.guard);
    }

    /// Every key and value, including writes made under this guard.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.items.live_entries(&self.guard)
    }
}

/// Read view of a [`SnapDictionary`] pinned to one generation.
///
/// Holding any clone keeps the generation observable; dropping the last one
/// lets the collector reclaim it.
pub struct DictSnapshot<K, V> {
    reference: Arc<GenRef>,
    inner: Arc<DictInner<K, V>>,
}

impl<K, V> Clone for DictSnapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            reference: Arc::clone(&self.reference),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for DictSnapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictSnapshot")
            .field("generation", &self.reference.generation())
            .finish()
    }
}

impl<K, V> DictSnapshot<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Pinned generation.
    pub fn generation(&self) -> Generation {
        self.reference.generation()
    }

    /// Value of `key` as of this snapshot.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.get(key, self.generation())
    }

    /// Every key and value visible to this snapshot, in no particular order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.items.entries_at(self.generation())
    }

    /// Keys visible to this snapshot.
    pub fn keys(&self) -> Vec<K> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Values visible to this snapshot.
    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// True when no key is visible to this snapshot.
    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty_at(self.generation())
    }

    /// True when both handles share one issued reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reference, &other.reference)
    }
}
