#![allow(missing_docs)]

use contentcache::content::{ContentData, ContentKit, ContentStore, ItemKind, PublishedContentType};
use contentcache::storage::{SnapDictionary, StoreOptions};
use contentcache::types::{ContentId, ContentTypeId, Result};

fn manual_dict() -> Result<SnapDictionary<u32, String>> {
    SnapDictionary::with_options(StoreOptions::new().auto_collect(false))
}

fn page(id: u32, name: &str) -> ContentKit {
    ContentKit::new(ContentId(id), ContentTypeId(1)).with_published(ContentData::new(name, 1, true))
}

fn content_store() -> Result<ContentStore> {
    let store = ContentStore::with_options(ItemKind::Content, StoreOptions::new().auto_collect(false))?;
    store.set_all_content_types(vec![PublishedContentType::new(
        ContentTypeId(1),
        "page",
        ItemKind::Content,
    )]);
    Ok(store)
}

#[test]
fn snapshot_keeps_its_generation_after_further_writes() -> Result<()> {
    let dict = manual_dict()?;
    dict.write().set(1, "one".to_string());
    let s1 = dict.create_snapshot();
    dict.write().set(1, "two".to_string());
    let s2 = dict.create_snapshot();

    for round in 0..10 {
        dict.write().set(1, format!("later {round}"));
        drop(dict.create_snapshot());
    }

    assert_eq!(s1.get(&1).as_deref(), Some("one"));
    assert_eq!(s2.get(&1).as_deref(), Some("two"));
    assert!(s1.generation() < s2.generation());
    Ok(())
}

#[test]
fn snapshot_taken_before_a_write_never_sees_it() -> Result<()> {
    let dict = manual_dict()?;
    dict.write().set(1, "one".to_string());
    let before = dict.create_snapshot();
    {
        let writer = dict.write();
        writer.set(2, "two".to_string());
        writer.clear(&1);
    }
    assert_eq!(before.get(&1).as_deref(), Some("one"));
    assert_eq!(before.get(&2), None);

    let after = dict.create_snapshot();
    assert_eq!(after.get(&1), None);
    assert_eq!(after.get(&2).as_deref(), Some("two"));
    Ok(())
}

#[test]
fn back_to_back_snapshots_share_identity() -> Result<()> {
    let store = content_store()?;
    store.apply_kit(page(1, "home"));
    let a = store.create_snapshot();
    let b = store.create_snapshot();
    assert!(a.ptr_eq(&b));
    assert_eq!(store.snapshot_count(), 1);

    store.apply_kit(page(1, "home v2"));
    let c = store.create_snapshot();
    assert!(!a.ptr_eq(&c));
    assert_eq!(store.snapshot_count(), 2);
    Ok(())
}

#[test]
fn writes_between_snapshots_share_a_generation() -> Result<()> {
    let store = content_store()?;
    let first = store.create_snapshot().generation();
    store.apply_kit(page(1, "a"));
    store.apply_kit(page(2, "b"));
    store.apply_kit(page(1, "c"));
    let second = store.create_snapshot();
    assert_eq!(second.generation(), first + 1);
    assert_eq!(store.node_generations(ContentId(1)), vec![second.generation()]);
    assert_eq!(
        second.get(ContentId(1)).and_then(|n| n.name(false).map(str::to_owned)),
        Some("c".to_owned())
    );
    Ok(())
}

#[test]
fn snapshot_created_during_a_write_sees_the_previous_generation() -> Result<()> {
    let store = content_store()?;
    store.apply_kit(page(1, "published"));
    let settled = store.create_snapshot().generation();

    let mut writer = store.write();
    writer.set(page(1, "half written"));
    writer.set(page(2, "new"));
    let during = store.create_snapshot();
    assert_eq!(during.generation(), settled);
    assert_eq!(
        during.get(ContentId(1)).and_then(|n| n.name(false).map(str::to_owned)),
        Some("published".to_owned())
    );
    assert!(during.get(ContentId(2)).is_none());
    drop(writer);

    let after = store.create_snapshot();
    assert!(after.generation() > during.generation());
    assert!(after.get(ContentId(2)).is_some());
    Ok(())
}

#[test]
fn type_lookups_follow_the_snapshot_generation() -> Result<()> {
    let store = content_store()?;
    let before = store.create_snapshot();
    store.update_content_types(
        &[],
        vec![PublishedContentType::new(ContentTypeId(1), "article", ItemKind::Content)],
        Vec::new(),
    );
    let after = store.create_snapshot();

    assert!(before.get_content_type_by_alias("page").is_some());
    assert!(before.get_content_type_by_alias("article").is_none());
    assert!(after.get_content_type_by_alias("page").is_none());
    assert_eq!(
        after.get_content_type(ContentTypeId(1)).map(|t| t.alias.clone()),
        Some("article".to_string())
    );
    Ok(())
}
