//! Per-key version chains.
//!
//! A chain is a newest-first singly linked list of `(value, generation)`
//! entries. Entries are immutable once published; the only mutable parts are
//! the head pointer and the `next` pointers, both swapped atomically so that
//! readers walk the chain without taking any lock.

use std::cmp::Ordering;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::types::Generation;

/// One version of a key. `value == None` marks a deletion.
pub(crate) struct Link<V> {
    value: Option<V>,
    generation: Generation,
    next: ArcSwapOption<Link<V>>,
}

impl<V> Link<V> {
    fn new(value: Option<V>, generation: Generation, next: Option<Arc<Link<V>>>) -> Self {
        Self {
            value,
            generation,
            next: ArcSwapOption::new(next),
        }
    }

    pub(crate) fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub(crate) fn next(&self) -> Option<Arc<Link<V>>> {
        self.next.load_full()
    }
}

/// How a write landed on a chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ChainWrite {
    /// The head already belonged to the live generation and was replaced.
    InPlace,
    /// A new head stamped with the live generation was prepended.
    Prepended,
}

/// Result of pruning one chain against the floor generation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct PruneOutcome {
    /// Entries visited before reaching the floor entry (inclusive).
    pub examined: u64,
    /// Entries unlinked below the floor entry.
    pub pruned: u64,
    /// The chain is a single absent entry at or below the floor.
    pub dead: bool,
}

pub(crate) struct Chain<V> {
    head: ArcSwap<Link<V>>,
}

impl<V: Clone> Chain<V> {
    pub(crate) fn new(value: Option<V>, generation: Generation) -> Self {
        Self {
            head: ArcSwap::from_pointee(Link::new(value, generation, None)),
        }
    }

    /// Returns the newest entry whose generation is `<= generation`.
    pub(crate) fn visible(&self, generation: Generation) -> Option<Arc<Link<V>>> {
        let mut link = self.head.load_full();
        loop {
            if link.generation <= generation {
                return Some(link);
            }
            link = link.next()?;
        }
    }

    /// Value visible at `generation`, if any.
    pub(crate) fn get(&self, generation: Generation) -> Option<V> {
        self.visible(generation)
            .and_then(|link| link.value.clone())
    }

    /// Value of the head entry, as seen by the writer.
    pub(crate) fn live(&self) -> Option<V> {
        self.head.load().value.clone()
    }

    /// Records `value` at the `live` generation.
    ///
    /// Must only be called with the writer lock held.
    pub(crate) fn write(&self, live: Generation, value: Option<V>) -> ChainWrite {
        let head = self.head.load_full();
        match head.generation.cmp(&live) {
            Ordering::Equal => {
                // No snapshot can be pinned to the open generation.
                let next = head.next();
                self.head.store(Arc::new(Link::new(value, live, next)));
                ChainWrite::InPlace
            }
            Ordering::Less => {
                self.head.store(Arc::new(Link::new(value, live, Some(head))));
                ChainWrite::Prepended
            }
            Ordering::Greater => panic!(
                "chain head generation {} is newer than live generation {live}",
                head.generation
            ),
        }
    }

    /// True when the chain holds nothing but one absent entry.
    pub(crate) fn is_standalone_absent(&self) -> bool {
        let head = self.head.load();
        head.value.is_none() && head.next.load().is_none()
    }

    /// Unlinks every entry older than the newest one at or below `floor`.
    ///
    /// Must only be called with the writer lock held.
    pub(crate) fn prune(&self, floor: Generation) -> PruneOutcome {
        let mut outcome = PruneOutcome::default();
        let head = self.head.load_full();
        let mut link = Arc::clone(&head);
        loop {
            outcome.examined += 1;
            if link.generation <= floor {
                let mut tail = link.next.swap(None);
                while let Some(dropped) = tail {
                    outcome.pruned += 1;
                    tail = dropped.next.swap(None);
                }
                break;
            }
            match link.next() {
                Some(next) => link = next,
                None => break,
            }
        }
        outcome.dead = head.generation <= floor
            && head.value.is_none()
            && head.next.load().is_none();
        outcome
    }

    /// Generations of every retained entry, newest first.
    pub(crate) fn generations(&self) -> Vec<Generation> {
        let mut out = Vec::new();
        let mut cursor = Some(self.head.load_full());
        while let Some(link) = cursor {
            out.push(link.generation);
            cursor = link.next();
        }
        out
    }
}
