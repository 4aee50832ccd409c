use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::collector::CollectStats;

/// Trait for tracking store activity.
///
/// Implementations receive snapshot issue, kit application and collection
/// events. They are called on writer, reader and collector threads alike and
/// must be cheap.
pub trait StoreMetrics: Send + Sync {
    /// Records a snapshot request.
    ///
    /// # Parameters
    /// * `reused` - Whether the previously issued snapshot was handed out again.
    fn snapshot_issued(&self, reused: bool);

    /// Records a kit applied to the tree.
    fn kit_applied(&self);

    /// Records a kit skipped for a structural reason.
    ///
    /// # Parameters
    /// * `reason` - Short machine-readable reason, e.g. `"missing_parent"`.
    fn kit_skipped(&self, reason: &'static str);

    /// Records a finished collection pass.
    fn collection_finished(&self, stats: &CollectStats);
}

/// A no-op implementation of [`StoreMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn snapshot_issued(&self, _reused: bool) {}
    fn kit_applied(&self) {}
    fn kit_skipped(&self, _reason: &'static str) {}
    fn collection_finished(&self, _stats: &CollectStats) {}
}

/// A thread-safe counter-based implementation of [`StoreMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Snapshots created fresh.
    pub snapshots_created: AtomicU64,

    /// Snapshot requests answered with the previously issued snapshot.
    pub snapshots_reused: AtomicU64,

    /// Kits applied.
    pub kits_applied: AtomicU64,

    /// Kits skipped because their parent was missing.
    pub kits_skipped_missing_parent: AtomicU64,

    /// Kits skipped for any other structural reason.
    pub kits_skipped_other: AtomicU64,

    /// Collection passes finished.
    pub collections: AtomicU64,

    /// Chain entries pruned across all passes.
    pub entries_pruned: AtomicU64,

    /// Keys removed across all passes.
    pub keys_removed: AtomicU64,
}

impl CounterMetrics {
    /// Total kits skipped for any reason.
    pub fn kits_skipped(&self) -> u64 {
        self.kits_skipped_missing_parent.load(Ordering::Relaxed)
            + self.kits_skipped_other.load(Ordering::Relaxed)
    }
}

impl StoreMetrics for CounterMetrics {
    fn snapshot_issued(&self, reused: bool) {
        if reused {
            self.snapshots_reused.fetch_add(1, Ordering::Relaxed);
        } else {
            self.snapshots_created.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn kit_applied(&self) {
        self.kits_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn kit_skipped(&self, reason: &'static str) {
        match reason {
            "missing_parent" => {
                self.kits_skipped_missing_parent
                    .fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.kits_skipped_other.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn collection_finished(&self, stats: &CollectStats) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.entries_pruned
            .fetch_add(stats.entries_pruned, Ordering::Relaxed);
        self.keys_removed
            .fetch_add(stats.keys_removed, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn StoreMetrics> {
    Arc::new(NoopMetrics)
}
