//! Background reclamation of chain entries no snapshot can observe.
//!
//! A pass first moves the floor past snapshot references that have been
//! released (front of the FIFO queue only), then prunes every chain of the
//! store below that floor. At most one pass runs at a time per store; it runs
//! on its own thread and is only ever waited on by instrumentation.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::primitives::concurrency::{GenRef, GenerationClock};
use crate::types::Generation;

use super::metrics::StoreMetrics;
use super::options::StoreOptions;

/// Statistics describing one collection pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct CollectStats {
    /// Floor generation applied by the pass.
    pub floor: Generation,
    /// Snapshot references dequeued because they were released.
    pub released_snapshots: u64,
    /// Chain entries visited.
    pub entries_examined: u64,
    /// Chain entries unlinked.
    pub entries_pruned: u64,
    /// Keys removed because only a released deletion remained.
    pub keys_removed: u64,
    /// Wall time of the pass.
    #[serde(with = "duration_micros")]
    pub elapsed: Duration,
}

mod duration_micros {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_micros().min(u64::MAX as u128) as u64)
    }
}

/// A store whose maps can be pruned by the collector.
pub(crate) trait Collect: Send + Sync + 'static {
    fn clock(&self) -> &GenerationClock;

    fn collector(&self) -> &Collector;

    fn options(&self) -> &StoreOptions;

    fn metrics(&self) -> &dyn StoreMetrics;

    /// Prunes every map of the store below `floor`.
    fn prune_below(&self, floor: Generation, stats: &mut CollectStats);
}

#[derive(Default)]
struct CollectorState {
    running: bool,
    passes: u64,
    last: Option<CollectStats>,
}

/// Single-flight driver for collection passes.
pub(crate) struct Collector {
    state: Arc<Mutex<CollectorState>>,
    done: Arc<Condvar>,
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectorState::default())),
            done: Arc::new(Condvar::new()),
        }
    }

    /// Starts a background pass unless one is already running.
    ///
    /// Returns `true` when this call started the pass.
    pub(crate) fn spawn<T: Collect>(&self, target: Arc<T>) -> bool {
        let name = target.options().collector_thread_name.clone();
        self.start(target, |job| thread::Builder::new().name(name).spawn(job).map(drop))
    }

    fn start<T, L>(&self, target: Arc<T>, launch: L) -> bool
    where
        T: Collect,
        L: FnOnce(Box<dyn FnOnce() + Send>) -> io::Result<()>,
    {
        {
            let mut state = self.state.lock();
            if state.running {
                return false;
            }
            state.running = true;
        }
        let finish = PassFinish {
            state: Arc::clone(&self.state),
            done: Arc::clone(&self.done),
            stats: None,
        };
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let mut finish = finish;
            finish.stats = Some(run_pass(target.as_ref()));
        });
        match launch(job) {
            Ok(()) => true,
            Err(err) => {
                // The job and its PassFinish were dropped, clearing `running`.
                // The caller may hold the writer lock, so the pass is skipped.
                warn!(error = %err, "store.collect.spawn_failed");
                false
            }
        }
    }

    /// Runs a pass on the calling thread, after any pending one.
    pub(crate) fn run_now<T: Collect>(&self, target: &T) -> CollectStats {
        {
            let mut state = self.state.lock();
            while state.running {
                self.done.wait(&mut state);
            }
            state.running = true;
        }
        let mut finish = PassFinish {
            state: Arc::clone(&self.state),
            done: Arc::clone(&self.done),
            stats: None,
        };
        let stats = run_pass(target);
        finish.stats = Some(stats);
        stats
    }

    /// Blocks until no pass is running.
    pub(crate) fn wait(&self) {
        let mut state = self.state.lock();
        while state.running {
            self.done.wait(&mut state);
        }
    }

    pub(crate) fn last_stats(&self) -> Option<CollectStats> {
        self.state.lock().last
    }

    pub(crate) fn passes(&self) -> u64 {
        self.state.lock().passes
    }
}

/// Clears the running flag when a pass ends, even by panic.
struct PassFinish {
    state: Arc<Mutex<CollectorState>>,
    done: Arc<Condvar>,
    stats: Option<CollectStats>,
}

impl Drop for PassFinish {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        if let Some(stats) = self.stats.take() {
            state.passes += 1;
            state.last = Some(stats);
        }
        self.done.notify_all();
    }
}

fn run_pass<T: Collect + ?Sized>(target: &T) -> CollectStats {
    let started = Instant::now();
    let advance = target.clock().advance_floor();
    let mut stats = CollectStats {
        floor: advance.floor,
        released_snapshots: advance.released,
        ..CollectStats::default()
    };
    target.prune_below(advance.floor, &mut stats);
    stats.elapsed = started.elapsed();
    debug!(
        previous_floor = advance.previous,
        floor = stats.floor,
        released = stats.released_snapshots,
        examined = stats.entries_examined,
        pruned = stats.entries_pruned,
        keys_removed = stats.keys_removed,
        micros = stats.elapsed.as_micros() as u64,
        "store.collect.done"
    );
    target.metrics().collection_finished(&stats);
    stats
}

/// Issues a snapshot reference for `target`, starting a background pass when
/// auto-collection is enabled and the floor lags far enough behind.
pub(crate) fn issue_snapshot<T: Collect>(target: &Arc<T>) -> Arc<GenRef> {
    let (reference, reused) = target.clock().issue();
    target.metrics().snapshot_issued(reused);
    let cfg = &target.options().collect;
    if !reused
        && cfg.auto
        && target.clock().collection_due(cfg.min_gen_delta)
        && target.collector().spawn(Arc::clone(target))
    {
        debug!(
            generation = reference.generation(),
            "store.collect.auto_started"
        );
    }
    reference
}
