//! Writer/reader churn against one content store.
//!
//! One writer keeps republishing, moving, removing and restoring nodes while
//! reader threads take snapshots and check that each one is a consistent tree.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::content::{ContentData, ContentKit, ContentSnapshot, ContentStore};
use crate::storage::CollectStats;
use crate::types::{CacheError, ContentId, Result};

use super::dump::KitDump;

/// Churn parameters.
#[derive(Clone, Copy, Debug)]
pub struct ChurnConfig {
    /// Writes performed by the writer.
    pub rounds: u32,
    /// Reader threads.
    pub readers: usize,
    /// Seed for the writer's choices.
    pub seed: u64,
}

/// Outcome of a churn run.
#[derive(Clone, Debug, Serialize)]
pub struct ChurnReport {
    /// Writes performed.
    pub writes: u64,
    /// Snapshots checked by readers.
    pub snapshots_checked: u64,
    /// Snapshots that failed a consistency check.
    pub inconsistent_snapshots: u64,
    /// Collection passes finished during the run.
    pub collection_passes: u64,
    /// Final synchronous collection pass.
    pub final_collection: CollectStats,
    /// Node keys left after the final pass.
    pub node_keys: usize,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
}

/// Checks parent/child links of every node visible to `snapshot`.
///
/// Returns the first problem found.
pub fn check_consistency(snapshot: &ContentSnapshot) -> std::result::Result<(), String> {
    for node in snapshot.get_all() {
        for child_id in node.child_ids() {
            let Some(child) = snapshot.get(*child_id) else {
                return Err(format!("node {} lists missing child {}", node.id(), child_id));
            };
            if child.parent_id() != Some(node.id()) {
                return Err(format!("child {} does not point back to {}", child_id, node.id()));
            }
        }
        match node.parent_id() {
            Some(parent_id) => {
                let Some(parent) = snapshot.get(parent_id) else {
                    return Err(format!("node {} has missing parent {}", node.id(), parent_id));
                };
                if !parent.child_ids().contains(&node.id()) {
                    return Err(format!("parent {} does not list {}", parent_id, node.id()));
                }
            }
            None => {
                if !snapshot.get_at_root().iter().any(|root| root.id() == node.id()) {
                    return Err(format!("top-level node {} is not a root", node.id()));
                }
            }
        }
    }
    Ok(())
}

/// Loads `dump` into `store` and churns it.
pub fn run_churn(store: &ContentStore, dump: &KitDump, config: ChurnConfig) -> Result<ChurnReport> {
    if dump.kits.is_empty() {
        return Err(CacheError::Invalid("churn needs at least one kit"));
    }
    let started = Instant::now();
    dump.apply_to(store);
    let passes_before = store.stats().collection_passes;

    let stop = AtomicBool::new(false);
    let checked = AtomicU64::new(0);
    let inconsistent = AtomicU64::new(0);

    let writes = thread::scope(|scope| {
        for _ in 0..config.readers {
            scope.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    let snapshot = store.create_snapshot();
                    if let Err(problem) = check_consistency(&snapshot) {
                        warn!(generation = snapshot.generation(), %problem, "churn.reader.inconsistent");
                        inconsistent.fetch_add(1, Ordering::Relaxed);
                    }
                    checked.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        let writes = churn_writer(store, dump, config);
        stop.store(true, Ordering::Release);
        writes
    });

    store.wait_for_pending_collection();
    let final_collection = store.collect_now();
    let report = ChurnReport {
        writes,
        snapshots_checked: checked.into_inner(),
        inconsistent_snapshots: inconsistent.into_inner(),
        collection_passes: store.stats().collection_passes - passes_before,
        final_collection,
        node_keys: store.count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        writes = report.writes,
        checked = report.snapshots_checked,
        inconsistent = report.inconsistent_snapshots,
        passes = report.collection_passes,
        "churn.done"
    );
    Ok(report)
}

fn churn_writer(store: &ContentStore, dump: &KitDump, config: ChurnConfig) -> u64 {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (folders, leaves): (Vec<&ContentKit>, Vec<&ContentKit>) = dump
        .kits
        .iter()
        .partition(|kit| dump.kits.iter().any(|other| other.parent_id == Some(kit.id)));
    let mut writes = 0;
    for round in 0..config.rounds {
        let kit = &dump.kits[rng.gen_range(0..dump.kits.len())];
        match round % 5 {
            // Remove the subtree, then restore it in a later generation.
            0 => {
                store.remove(kit.id);
                let branch = branch_of(dump, kit.id);
                store.apply_branch(kit.id, branch);
                writes += 2;
            }
            // Re-parent a leaf under another folder, then put it back.
            1 if !folders.is_empty() && !leaves.is_empty() => {
                let leaf = leaves[rng.gen_range(0..leaves.len())];
                let folder = folders[rng.gen_range(0..folders.len())];
                if leaf.parent_id != Some(folder.id) {
                    store.apply_kit(leaf.clone().under(folder));
                    store.apply_kit(leaf.clone());
                    writes += 2;
                }
            }
            // Swap the payload.
            _ => {
                let data = ContentData::new(format!("{} r{round}", kit.id), round + 2, true);
                store.apply_kit(kit.clone().with_published(data));
                writes += 1;
            }
        }
        if round % 16 == 15 {
            // Drop everything this thread pinned and let the floor move.
            drop(store.create_snapshot());
        }
    }
    writes
}

/// Kits of `root` and its descendants, from the dump.
fn branch_of(dump: &KitDump, root: ContentId) -> Vec<ContentKit> {
    let mut ids = vec![root];
    let mut out = Vec::new();
    while let Some(id) = ids.pop() {
        for kit in &dump.kits {
            if kit.id == id {
                out.push(kit.clone());
            }
            if kit.parent_id == Some(id) {
                ids.push(kit.id);
            }
        }
    }
    out
}
