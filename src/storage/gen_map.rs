use std::borrow::Borrow;
use std::hash::{BuildHasherDefault, Hash};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use tracing::trace;

use crate::primitives::concurrency::{GenerationClock, WriteGuard};
use crate::types::Generation;

use super::chain::{Chain, PruneOutcome};
use super::collector::CollectStats;

type ChainMap<K, V> = DashMap<K, Arc<Chain<V>>, BuildHasherDefault<FxHasher>>;

/// Concurrent map of key -> version chain.
///
/// Lookups clone the chain handle under a shard read lock and walk it without
/// locking. Mutation goes through a [`WriteGuard`].
pub(crate) struct GenMap<K, V> {
    name: &'static str,
    chains: ChainMap<K, V>,
}

impl<K, V> GenMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            chains: DashMap::with_hasher(BuildHasherDefault::default()),
        }
    }

    fn chain<Q>(&self, key: &Q) -> Option<Arc<Chain<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.chains.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Value visible at `generation`.
    pub(crate) fn get<Q>(&self, key: &Q, generation: Generation) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.chain(key)?.get(generation)
    }

    /// Head value, as seen by the writer.
    pub(crate) fn get_live<Q>(&self, _write: &WriteGuard<'_>, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.chain(key)?.live()
    }

    pub(crate) fn set(&self, write: &WriteGuard<'_>, key: K, value: V) {
        let live = write.generation();
        match self.chains.entry(key) {
            Entry::Occupied(entry) => {
                entry.get().write(live, Some(value));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Chain::new(Some(value), live)));
            }
        }
    }

    pub(crate) fn clear<Q>(&self, write: &WriteGuard<'_>, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(chain) = self.chain(key) else {
            return;
        };
        if chain.live().is_none() {
            return;
        }
        chain.write(write.generation(), None);
        // Nothing older exists and nobody can see the live generation yet.
        if chain.is_standalone_absent() {
            self.chains.remove(key);
        }
    }

    pub(crate) fn clear_all(&self, write: &WriteGuard<'_>) {
        for key in self.keys() {
            self.clear(write, &key);
        }
    }

    fn keys(&self) -> Vec<K> {
        self.chains.iter().map(|entry| entry.key().clone()).collect()
    }

    fn chains(&self) -> Vec<(K, Arc<Chain<V>>)> {
        self.chains
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Keys and values visible at `generation`.
    pub(crate) fn entries_at(&self, generation: Generation) -> Vec<(K, V)> {
        self.chains()
            .into_iter()
            .filter_map(|(key, chain)| chain.get(generation).map(|value| (key, value)))
            .collect()
    }

    /// Keys and head values, as seen by the writer.
    pub(crate) fn live_entries(&self, _write: &WriteGuard<'_>) -> Vec<(K, V)> {
        self.chains()
            .into_iter()
            .filter_map(|(key, chain)| chain.live().map(|value| (key, value)))
            .collect()
    }

    /// True when no key has a value visible at `generation`.
    pub(crate) fn is_empty_at(&self, generation: Generation) -> bool {
        !self
            .chains()
            .iter()
            .any(|(_, chain)| chain.visible(generation).is_some_and(|link| link.value().is_some()))
    }

    /// Number of keys, including tombstones not yet collected.
    pub(crate) fn len(&self) -> usize {
        self.chains.len()
    }

    /// Prunes every chain below `floor`, taking the writer lock per key.
    pub(crate) fn prune(&self, clock: &GenerationClock, floor: Generation, stats: &mut CollectStats) {
        let removed_before = stats.keys_removed;
        for key in self.keys() {
            let _write = clock.prune_lock();
            let Some(chain) = self.chain(&key) else {
                continue;
            };
            let PruneOutcome {
                examined,
                pruned,
                dead,
            } = chain.prune(floor);
            stats.entries_examined += examined;
            stats.entries_pruned += pruned;
            if dead {
                self.chains.remove(&key);
                stats.keys_removed += 1;
            }
        }
        trace!(
            map = self.name,
            floor,
            keys_removed = stats.keys_removed - removed_before,
            "store.collect.map_pruned"
        );
    }

    /// Generations retained for `key`, newest first.
    pub(crate) fn generations<Q>(&self, key: &Q) -> Vec<Generation>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.chain(key)
            .map(|chain| chain.generations())
            .unwrap_or_default()
    }
}
