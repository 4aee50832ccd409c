//! Single-writer generation clock.
//!
//! The clock owns the writer lock and the bookkeeping shared by every map of
//! a store: the live and floor generations, the `dirty` flag recording that a
//! write opened the live generation after the last snapshot, and the FIFO
//! registry of weak references to issued snapshots.
//!
//! Readers never touch the clock. Snapshot issue takes the bookkeeping mutex
//! for a handful of field updates; writers hold the writer lock for the whole
//! write section.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::types::Generation;

/// Reference that keeps one generation observable.
///
/// Every snapshot handle holds one; the collector treats a generation as
/// released once all strong references are gone.
#[derive(Debug)]
pub struct GenRef {
    generation: Generation,
}

impl GenRef {
    /// Generation pinned by this reference.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[derive(Debug)]
struct QueuedRef {
    generation: Generation,
    reference: Weak<GenRef>,
}

#[derive(Debug, Default)]
struct ClockState {
    live: Generation,
    floor: Generation,
    dirty: bool,
    writer_active: bool,
    current: Option<Weak<GenRef>>,
    queue: VecDeque<QueuedRef>,
}

/// Point-in-time view of the clock counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct GenerationStatus {
    /// Generation currently open (or last opened) for writes.
    pub live: Generation,
    /// Newest generation whose snapshots have all been released.
    pub floor: Generation,
    /// Whether a write happened since the last snapshot was issued.
    pub dirty: bool,
    /// Number of snapshot references still queued for release.
    pub queued_snapshots: usize,
}

/// Result of moving the floor past released snapshots.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FloorAdvance {
    /// Floor before the advance.
    pub previous: Generation,
    /// Floor after the advance.
    pub floor: Generation,
    /// Snapshot references dequeued.
    pub released: u64,
}

/// Generation bookkeeping plus the writer lock for one store.
#[derive(Debug, Default)]
pub struct GenerationClock {
    state: Mutex<ClockState>,
    writer: Mutex<()>,
}

impl GenerationClock {
    /// Creates a clock at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the writer lock, opening a new generation when the previous
    /// one has already been handed to a snapshot.
    pub fn write(&self) -> WriteGuard<'_> {
        let lock = self.writer.lock();
        let generation = {
            let mut state = self.state.lock();
            if !state.dirty {
                state.live += 1;
                state.dirty = true;
            }
            state.writer_active = true;
            state.live
        };
        WriteGuard {
            clock: self,
            generation,
            _lock: lock,
        }
    }

    /// Takes the writer lock without opening a generation.
    ///
    /// Used by the collector so chain pruning never interleaves with a writer.
    pub(crate) fn prune_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Issues a reference for a new snapshot.
    ///
    /// Returns the previously issued reference (and `true`) when nothing was
    /// written since it was issued and it is still alive.
    pub fn issue(&self) -> (Arc<GenRef>, bool) {
        let mut state = self.state.lock();
        // A writer holding the lock may have half-written the live
        // generation; pin the one before it.
        let generation = if state.writer_active && state.dirty {
            state.live - 1
        } else {
            state.live
        };
        if let Some(current) = state.current.as_ref().and_then(Weak::upgrade) {
            if current.generation == generation {
                return (current, true);
            }
        }
        let reference = Arc::new(GenRef { generation });
        // A released entry for the same generation at the back gives up its slot.
        let entry = QueuedRef {
            generation,
            reference: Arc::downgrade(&reference),
        };
        let state = &mut *state;
        match state.queue.back_mut() {
            Some(back) if back.generation == generation && back.reference.strong_count() == 0 => {
                *back = entry;
            }
            _ => state.queue.push_back(entry),
        }
        state.current = Some(Arc::downgrade(&reference));
        if !state.writer_active {
            state.dirty = false;
        }
        (reference, false)
    }

    /// Dequeues released snapshot references from the front of the queue and
    /// moves the floor to the generation of the last one dequeued.
    pub fn advance_floor(&self) -> FloorAdvance {
        let mut state = self.state.lock();
        let previous = state.floor;
        let mut released = 0;
        while let Some(front) = state.queue.front() {
            if front.reference.strong_count() > 0 {
                break;
            }
            let generation = front.generation;
            state.queue.pop_front();
            state.floor = state.floor.max(generation);
            released += 1;
        }
        FloorAdvance {
            previous,
            floor: state.floor,
            released,
        }
    }

    /// True when the live generation is more than `min_delta` ahead of the floor.
    pub fn collection_due(&self, min_delta: u64) -> bool {
        let state = self.state.lock();
        state.live.saturating_sub(state.floor) > min_delta
    }

    /// Current counters.
    pub fn status(&self) -> GenerationStatus {
        let state = self.state.lock();
        GenerationStatus {
            live: state.live,
            floor: state.floor,
            dirty: state.dirty,
            queued_snapshots: state.queue.len(),
        }
    }
}

/// Proof that the holder is the single writer of a store.
///
/// Map mutation requires a `&WriteGuard`, so writing outside the writer lock
/// does not compile.
pub struct WriteGuard<'a> {
    clock: &'a GenerationClock,
    generation: Generation,
    _lock: MutexGuard<'a, ()>,
}

impl<'a> WriteGuard<'a> {
    /// Live generation all writes under this guard are stamped with.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        self.clock.state.lock().writer_active = false;
    }
}
