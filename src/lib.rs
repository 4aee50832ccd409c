//! In-memory published-content store with snapshot isolation.
//!
//! A single writer applies content edits while any number of readers work
//! against generation-pinned snapshots without taking locks. Versions no
//! snapshot can observe anymore are reclaimed in the background.
//!
//! ```
//! use contentcache::content::{ContentData, ContentKit, ContentStore, ItemKind, PublishedContentType};
//! use contentcache::types::{ContentId, ContentTypeId};
//!
//! let store = ContentStore::new(ItemKind::Content);
//! store.set_all_content_types(vec![PublishedContentType::new(
//!     ContentTypeId(1),
//!     "page",
//!     ItemKind::Content,
//! )]);
//! store.apply_kit(
//!     ContentKit::new(ContentId(1), ContentTypeId(1))
//!         .with_published(ContentData::new("home", 1, true)),
//! );
//! let before = store.create_snapshot();
//! store.remove(ContentId(1));
//! assert!(before.get(ContentId(1)).is_some());
//! assert!(store.create_snapshot().get(ContentId(1)).is_none());
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod content;
pub mod facade;
pub mod primitives;
pub mod storage;
pub mod types;
