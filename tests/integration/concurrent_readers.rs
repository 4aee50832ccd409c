#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use contentcache::cli::churn::check_consistency;
use contentcache::content::{ContentData, ContentKit, ContentStore, ItemKind, PublishedContentType};
use contentcache::storage::{SnapDictionary, StoreOptions};
use contentcache::types::{ContentId, ContentTypeId, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const READERS: usize = 4;

fn kit(id: u32, parent: Option<&ContentKit>, version: u32) -> ContentKit {
    let kit = ContentKit::new(ContentId(id), ContentTypeId(1))
        .with_published(ContentData::new(format!("n{id}"), version, true));
    match parent {
        Some(parent) => kit.under(parent),
        None => kit,
    }
}

/// Root 1 with children 2..=6, each with two leaves.
fn tree(version: u32) -> Vec<ContentKit> {
    let root = kit(1, None, version);
    let mut kits = vec![root.clone()];
    let mut next = 100;
    for id in 2..=6 {
        let child = kit(id, Some(&root), version);
        for _ in 0..2 {
            kits.push(kit(next, Some(&child), version));
            next += 1;
        }
        kits.push(child);
    }
    kits
}

#[test]
fn readers_see_a_consistent_tree_while_the_writer_churns() -> Result<()> {
    let store = ContentStore::with_options(ItemKind::Content, StoreOptions::new().min_gen_delta(2))?;
    store.set_all_content_types(vec![PublishedContentType::new(
        ContentTypeId(1),
        "page",
        ItemKind::Content,
    )]);
    store.load_all(tree(1));

    let stop = Arc::new(AtomicBool::new(false));
    let checked = Arc::new(AtomicU64::new(0));
    let start = Arc::new(Barrier::new(READERS + 1));
    let mut handles = Vec::new();
    for _ in 0..READERS {
        let store = store.clone();
        let stop = Arc::clone(&stop);
        let checked = Arc::clone(&checked);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            let mut last_generation = 0;
            while !stop.load(Ordering::Acquire) {
                let snapshot = store.create_snapshot();
                assert!(snapshot.generation() >= last_generation, "generations never go back");
                last_generation = snapshot.generation();
                if let Err(problem) = check_consistency(&snapshot) {
                    panic!("generation {}: {problem}", snapshot.generation());
                }
                // Branch replacement happens in one generation.
                assert_eq!(snapshot.get_all().len(), 16);
                checked.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    start.wait();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for round in 0..300u32 {
        let id = rng.gen_range(2..=6);
        if round % 3 == 0 {
            let branch: Vec<ContentKit> = tree(round + 2)
                .into_iter()
                .filter(|k| k.id == ContentId(id) || k.parent_id == Some(ContentId(id)))
                .collect();
            store.apply_branch(ContentId(id), branch);
        } else {
            store.write_locked(|writer| {
                for kit in tree(round + 2) {
                    writer.set(kit);
                }
            });
        }
    }
    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().expect("reader panicked");
    }
    assert!(checked.load(Ordering::Relaxed) > 0);

    store.wait_for_pending_collection();
    drop(store.create_snapshot());
    let stats = store.collect_now();
    assert_eq!(stats.floor, store.generations().live);
    for id in 2..=6 {
        assert_eq!(store.node_generations(ContentId(id)).len(), 1);
    }
    assert_eq!(store.count(), 16);
    Ok(())
}

#[test]
fn pinned_values_stay_stable_under_concurrent_writes() -> Result<()> {
    let dict: SnapDictionary<u32, u64> = SnapDictionary::with_options(StoreOptions::new().min_gen_delta(1))?;
    dict.write_locked(|writer| {
        for key in 0..32 {
            writer.set(key, 0);
        }
    });

    let stop = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(READERS + 1));
    let mut handles = Vec::new();
    for _ in 0..READERS {
        let dict = dict.clone();
        let stop = Arc::clone(&stop);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            while !stop.load(Ordering::Acquire) {
                let snapshot = dict.create_snapshot();
                // Every write bumps all keys together.
                let values = snapshot.values();
                assert_eq!(values.len(), 32);
                let first = values[0];
                assert!(values.iter().all(|v| *v == first), "torn read at {}", snapshot.generation());
                assert_eq!(snapshot.get(&0), Some(first));
            }
        }));
    }

    start.wait();
    for round in 1..=500u64 {
        dict.write_locked(|writer| {
            for key in 0..32 {
                writer.set(key, round);
            }
        });
    }
    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().expect("reader panicked");
    }

    dict.wait_for_pending_collection();
    drop(dict.create_snapshot());
    dict.collect_now();
    assert_eq!(dict.key_generations(&5).len(), 1);
    assert_eq!(dict.create_snapshot().get(&5), Some(500));
    Ok(())
}
