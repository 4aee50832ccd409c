use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::primitives::concurrency::{GenerationClock, GenerationStatus, WriteGuard};
use crate::storage::collector::{issue_snapshot, Collect, Collector};
use crate::storage::gen_map::GenMap;
use crate::storage::{default_metrics, CollectStats, StoreMetrics, StoreOptions};
use crate::types::{ContentId, ContentTypeId, DataTypeId, Generation, Result};

use super::model::{ContentKit, ContentNode, ItemKind, PublishedContentType};
use super::snapshot::ContentSnapshot;
use super::tree::{KitOutcome, LoadReport};
use super::types::TypeRebuild;

pub(crate) type TypeIndex = FxHashMap<ContentTypeId, FxHashSet<ContentId>>;

pub(crate) struct StoreInner {
    pub(crate) kind: ItemKind,
    pub(crate) clock: GenerationClock,
    pub(crate) nodes: GenMap<ContentId, Arc<ContentNode>>,
    pub(crate) roots: GenMap<ContentId, ()>,
    pub(crate) types_by_id: GenMap<ContentTypeId, Arc<PublishedContentType>>,
    pub(crate) types_by_alias: GenMap<String, Arc<PublishedContentType>>,
    /// Content type -> node ids. Writer-only, never read by snapshots.
    type_nodes: Mutex<TypeIndex>,
    collector: Collector,
    options: StoreOptions,
    pub(crate) metrics: Arc<dyn StoreMetrics>,
}

impl Collect for StoreInner {
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
        self.nodes.prune(&self.clock, floor, stats);
        self.roots.prune(&self.clock, floor, stats);
        self.types_by_id.prune(&self.clock, floor, stats);
        self.types_by_alias.prune(&self.clock, floor, stats);
    }
}

/// Engine counters of a content store.
#[derive(Clone, Debug, Serialize)]
pub struct StoreStats {
    /// Kind of items held.
    pub kind: ItemKind,
    /// Generation counters.
    pub generations: GenerationStatus,
    /// Node keys, including tombstones not yet collected.
    pub node_keys: usize,
    /// Root membership keys.
    pub root_keys: usize,
    /// Content-type keys (by id).
    pub content_type_keys: usize,
    /// Finished collection passes.
    pub collection_passes: u64,
    /// Last finished pass.
    pub last_collection: Option<CollectStats>,
}

/// Generational store of one tree of content (or media).
///
/// One writer at a time applies kits through [`ContentStore::write`]; any
/// number of threads read through [`ContentSnapshot`]s without locking.
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("kind", &self.inner.kind)
            .field("status", &self.inner.clock.status())
            .finish()
    }
}

impl ContentStore {
    /// Creates an empty store with default options.
    pub fn new(kind: ItemKind) -> Self {
        Self::build(kind, StoreOptions::default())
    }

    /// Creates an empty store with the given options.
    pub fn with_options(kind: ItemKind, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(kind, options))
    }

    fn build(kind: ItemKind, options: StoreOptions) -> Self {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Self {
            inner: Arc::new(StoreInner {
                kind,
                clock: GenerationClock::new(),
                nodes: GenMap::new("nodes"),
                roots: GenMap::new("roots"),
                types_by_id: GenMap::new("types_by_id"),
                types_by_alias: GenMap::new("types_by_alias"),
                type_nodes: Mutex::new(TypeIndex::default()),
                collector: Collector::new(),
                options,
                metrics,
            }),
        }
    }

    /// Kind of items held.
    pub fn kind(&self) -> ItemKind {
        self.inner.kind
    }

    /// Enters the write lock.
    pub fn write(&self) -> ContentWriter<'_> {
        let guard = self.inner.clock.write();
        ContentWriter {
            index: self.inner.type_nodes.lock(),
            guard,
            store: &self.inner,
        }
    }

    /// Runs `action` inside the write lock.
    pub fn write_locked<R>(&self, action: impl FnOnce(&mut ContentWriter<'_>) -> R) -> R {
        let mut writer = self.write();
        action(&mut writer)
    }

    /// Returns a read view pinned to the newest complete generation.
    pub fn create_snapshot(&self) -> ContentSnapshot {
        let reference = issue_snapshot(&self.inner);
        ContentSnapshot::new(reference, Arc::clone(&self.inner))
    }

    /// Replaces the whole tree with `kits`.
    pub fn load_all(&self, kits: Vec<ContentKit>) -> LoadReport {
        self.write().set_all(kits)
    }

    /// Inserts or updates one node.
    pub fn apply_kit(&self, kit: ContentKit) -> KitOutcome {
        self.write().set(kit)
    }

    /// Replaces the branch rooted at `root_id`.
    pub fn apply_branch(&self, root_id: ContentId, kits: Vec<ContentKit>) -> LoadReport {
        self.write().set_branch(root_id, kits)
    }

    /// Removes a node and its subtree.
    pub fn remove(&self, id: ContentId) -> bool {
        self.write().clear(id)
    }

    /// Replaces the whole set of content types.
    pub fn set_all_content_types(&self, types: Vec<PublishedContentType>) -> TypeRebuild {
        self.write().set_all_content_types(types)
    }

    /// Applies a content-type schema change.
    pub fn update_content_types(
        &self,
        removed: &[ContentTypeId],
        refreshed: Vec<PublishedContentType>,
        kits: Vec<ContentKit>,
    ) -> TypeRebuild {
        self.write().update_content_types(removed, refreshed, kits)
    }

    /// Refreshes every content type using one of `data_type_ids`.
    pub fn update_data_types<F>(&self, data_type_ids: &[DataTypeId], resolve: F) -> TypeRebuild
    where
        F: FnMut(&PublishedContentType) -> Option<PublishedContentType>,
    {
        self.write().update_data_types(data_type_ids, resolve)
    }

    /// Number of node keys, including tombstones not yet collected.
    pub fn count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Number of issued snapshots not yet dequeued by the collector.
    pub fn snapshot_count(&self) -> usize {
        self.inner.clock.status().queued_snapshots
    }

    /// Live and floor generations.
    pub fn generations(&self) -> GenerationStatus {
        self.inner.clock.status()
    }

    /// Generations retained for node `id`, newest first.
    pub fn node_generations(&self, id: ContentId) -> Vec<Generation> {
        self.inner.nodes.generations(&id)
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

    /// Engine counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            kind: self.inner.kind,
            generations: self.inner.clock.status(),
            node_keys: self.inner.nodes.len(),
            root_keys: self.inner.roots.len(),
            content_type_keys: self.inner.types_by_id.len(),
            collection_passes: self.inner.collector.passes(),
            last_collection: self.inner.collector.last_stats(),
        }
    }
}

/// Exclusive write access to a [`ContentStore`].
///
/// Every edit made through one writer lands in the same generation.
/// Snapshots created while it is alive do not observe any of them.
pub struct ContentWriter<'a> {
    pub(crate) index: MutexGuard<'a, TypeIndex>,
    pub(crate) guard: WriteGuard<'a>,
    pub(crate) store: &'a StoreInner,
}

impl<'a> ContentWriter<'a> {
    /// Live generation of this write.
    pub fn generation(&self) -> Generation {
        self.guard.generation()
    }

    /// Node as currently written.
    pub fn get(&self, id: ContentId) -> Option<Arc<ContentNode>> {
        self.store.nodes.get_live(&self.guard, &id)
    }

    /// Content type as currently written.
    pub fn get_content_type(&self, id: ContentTypeId) -> Option<Arc<PublishedContentType>> {
        self.store.types_by_id.get_live(&self.guard, &id)
    }

    /// Content type by alias, as currently written.
    pub fn get_content_type_by_alias(&self, alias: &str) -> Option<Arc<PublishedContentType>> {
        self.store.types_by_alias.get_live(&self.guard, alias)
    }

    /// Ids of the nodes bound to content type `id`.
    pub fn nodes_of_type(&self, id: ContentTypeId) -> Vec<ContentId> {
        let mut ids: Vec<ContentId> = self
            .index
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub(crate) fn index_node(&mut self, content_type: ContentTypeId, id: ContentId) {
        self.index.entry(content_type).or_default().insert(id);
    }

    pub(crate) fn unindex_node(&mut self, content_type: ContentTypeId, id: ContentId) {
        if let Some(ids) = self.index.get_mut(&content_type) {
            ids.remove(&id);
            if ids.is_empty() {
                self.index.remove(&content_type);
            }
        }
    }

    pub(crate) fn take_type_nodes(&mut self, content_type: ContentTypeId) -> FxHashSet<ContentId> {
        self.index.remove(&content_type).unwrap_or_default()
    }

    pub(crate) fn clear_index(&mut self) {
        self.index.clear();
    }
}
