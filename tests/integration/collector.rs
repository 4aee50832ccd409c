#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use contentcache::content::{ContentData, ContentKit, ContentStore, ItemKind, PublishedContentType};
use contentcache::storage::{CollectCfg, CounterMetrics, SnapDictionary, StoreOptions};
use contentcache::types::{CacheError, ContentId, ContentTypeId, Result};

fn page(id: u32, name: &str) -> ContentKit {
    ContentKit::new(ContentId(id), ContentTypeId(1)).with_published(ContentData::new(name, 1, true))
}

fn store_with(options: StoreOptions) -> Result<ContentStore> {
    let store = ContentStore::with_options(ItemKind::Content, options)?;
    store.set_all_content_types(vec![PublishedContentType::new(
        ContentTypeId(1),
        "page",
        ItemKind::Content,
    )]);
    Ok(store)
}

fn manual_store() -> Result<ContentStore> {
    store_with(StoreOptions::new().auto_collect(false))
}

#[test]
fn removed_node_is_reclaimed_once_no_snapshot_can_see_it() -> Result<()> {
    let store = manual_store()?;
    store.apply_kit(page(1, "home"));
    drop(store.create_snapshot());
    store.remove(ContentId(1));
    drop(store.create_snapshot());

    assert_eq!(store.node_generations(ContentId(1)).len(), 2);
    let stats = store.collect_now();
    assert_eq!(stats.released_snapshots, 2);
    assert!(stats.entries_pruned >= 1);
    assert!(stats.keys_removed >= 2, "node and root keys go away");
    assert!(store.node_generations(ContentId(1)).is_empty());
    assert_eq!(store.count(), 0);
    assert_eq!(store.stats().root_keys, 0);
    Ok(())
}

#[test]
fn floor_moves_by_the_number_of_released_generations() -> Result<()> {
    let store = manual_store()?;
    drop(store.create_snapshot());
    let start = store.collect_now().floor;

    for round in 0..5 {
        store.apply_kit(page(1, &format!("round {round}")));
        drop(store.create_snapshot());
    }
    let stats = store.collect_now();
    assert_eq!(stats.released_snapshots, 5);
    assert_eq!(stats.floor, start + 5);
    assert_eq!(store.node_generations(ContentId(1)), vec![stats.floor]);
    Ok(())
}

#[test]
fn held_snapshot_stops_the_floor() -> Result<()> {
    let store = manual_store()?;
    store.apply_kit(page(1, "pinned"));
    let pinned = store.create_snapshot();

    for round in 0..4 {
        store.apply_kit(page(1, &format!("later {round}")));
        drop(store.create_snapshot());
    }
    let stats = store.collect_now();
    assert_eq!(stats.released_snapshots, 0);
    assert!(stats.floor < pinned.generation());
    assert_eq!(
        pinned.get(ContentId(1)).and_then(|n| n.name(false).map(str::to_owned)),
        Some("pinned".to_owned())
    );

    drop(pinned);
    let stats = store.collect_now();
    assert_eq!(stats.released_snapshots, 5);
    assert_eq!(store.node_generations(ContentId(1)).len(), 1);
    Ok(())
}

#[test]
fn collection_leaves_the_live_view_intact() -> Result<()> {
    let store = manual_store()?;
    let root = page(1, "root");
    store.load_all(vec![root.clone(), page(2, "child").under(&root)]);
    for round in 0..3 {
        drop(store.create_snapshot());
        store.apply_kit(page(2, &format!("child {round}")).under(&root));
    }
    store.collect_now();

    let writer = store.write();
    assert_eq!(
        writer.get(ContentId(2)).and_then(|n| n.name(false).map(str::to_owned)),
        Some("child 2".to_owned())
    );
    assert_eq!(writer.child_ids(ContentId(1)), vec![ContentId(2)]);
    drop(writer);

    let snapshot = store.create_snapshot();
    assert_eq!(snapshot.children(ContentId(1)).len(), 1);
    Ok(())
}

#[test]
fn snapshot_creation_starts_background_passes() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let store = store_with(
        StoreOptions::new()
            .min_gen_delta(2)
            .metrics(metrics.clone()),
    )?;

    for round in 0..8 {
        store.apply_kit(page(1, &format!("round {round}")));
        drop(store.create_snapshot());
    }
    store.wait_for_pending_collection();

    assert_eq!(metrics.snapshots_created.load(Ordering::Relaxed), 8);
    assert_eq!(metrics.snapshots_reused.load(Ordering::Relaxed), 0);
    assert!(metrics.collections.load(Ordering::Relaxed) >= 1);
    assert!(store.stats().collection_passes >= 1);
    assert!(store.last_collect_stats().is_some());

    let a = store.create_snapshot();
    let b = store.create_snapshot();
    assert!(a.ptr_eq(&b));
    assert_eq!(metrics.snapshots_reused.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test]
fn disabled_auto_collection_never_runs_a_pass() -> Result<()> {
    let store = manual_store()?;
    for round in 0..10 {
        store.apply_kit(page(1, &format!("round {round}")));
        drop(store.create_snapshot());
    }
    store.wait_for_pending_collection();
    assert_eq!(store.stats().collection_passes, 0);
    assert_eq!(store.snapshot_count(), 10);
    Ok(())
}

#[test]
fn kit_outcomes_are_counted() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let store = store_with(StoreOptions::new().metrics(metrics.clone()))?;
    let mut orphan = page(2, "orphan");
    orphan.parent_id = Some(ContentId(40));
    store.load_all(vec![
        page(1, "home"),
        orphan,
        ContentKit::new(ContentId(3), ContentTypeId(1)),
    ]);

    assert_eq!(metrics.kits_applied.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.kits_skipped_missing_parent.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.kits_skipped_other.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.kits_skipped(), 2);
    Ok(())
}

#[test]
fn pruning_counts_reach_the_metrics() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let dict: SnapDictionary<u32, u32> =
        SnapDictionary::with_options(StoreOptions::new().auto_collect(false).metrics(metrics.clone()))?;
    dict.write().set(7, 1);
    drop(dict.create_snapshot());
    dict.write().clear(&7);
    drop(dict.create_snapshot());

    let stats = dict.collect_now();
    assert_eq!(metrics.collections.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.entries_pruned.load(Ordering::Relaxed), stats.entries_pruned);
    assert_eq!(metrics.keys_removed.load(Ordering::Relaxed), 1);
    assert_eq!(dict.count(), 0);
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let options = StoreOptions::from_toml_str(
        r#"
        collector_thread_name = "media-collect"

        [collect]
        auto = false
        min_gen_delta = 9
        "#,
    )?;
    assert_eq!(options.collector_thread_name, "media-collect");
    assert_eq!(
        options.collect,
        CollectCfg {
            auto: false,
            min_gen_delta: 9
        }
    );

    let partial = StoreOptions::from_toml_str("[collect]\nmin_gen_delta = 1\n")?;
    assert!(partial.collect.auto);
    assert_eq!(partial.collect.min_gen_delta, 1);
    Ok(())
}

#[test]
fn bad_options_are_rejected() {
    assert!(matches!(
        StoreOptions::from_toml_str("collector_thread_name = \"  \""),
        Err(CacheError::Invalid(_))
    ));
    assert!(matches!(
        StoreOptions::from_toml_str("workers = 3"),
        Err(CacheError::Config(_))
    ));
    assert!(matches!(
        ContentStore::with_options(
            ItemKind::Media,
            StoreOptions::new().collector_thread_name(""),
        ),
        Err(CacheError::Invalid(_))
    ));
}

#[test]
fn options_file_is_read_from_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("store.toml");
    std::fs::write(&path, "[collect]\nauto = false\n")?;
    let options = StoreOptions::from_toml_file(&path)?;
    assert!(!options.collect.auto);

    let missing = StoreOptions::from_toml_file(dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(CacheError::Io(_))));
    Ok(())
}
