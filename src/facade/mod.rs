//! Per-request read facade for the rendering layer.
//!
//! A [`PublishedSnapshot`] bundles one content snapshot, one media snapshot
//! and a request-scoped cache of computed values. It is created by a
//! [`PublishedSnapshotService`] and handed down explicitly; nothing reaches
//! it through global state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::content::{ContentData, ContentNode, ContentSnapshot, ContentStore, ItemKind};
use crate::storage::StoreOptions;
use crate::types::{ContentId, Result};

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Request-scoped cache of computed values keyed by string.
#[derive(Default)]
pub struct ElementsCache {
    entries: Mutex<FxHashMap<String, CachedValue>>,
}

impl fmt::Debug for ElementsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementsCache")
            .field("len", &self.len())
            .finish()
    }
}

impl ElementsCache {
    /// Returns the value cached under `key`, computing it with `init` when
    /// absent or cached with another type.
    ///
    /// `init` runs outside the cache lock.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(hit) = self.get::<T>(key) {
            return hit;
        }
        let value = Arc::new(init());
        let mut entries = self.entries.lock();
        if let Some(raced) = entries
            .get(key)
            .and_then(|existing| Arc::clone(existing).downcast::<T>().ok())
        {
            return raced;
        }
        entries.insert(key.to_owned(), Arc::clone(&value) as CachedValue);
        value
    }

    /// Value cached under `key`, if it has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every cached value.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Content and media views of one request.
#[derive(Debug)]
pub struct PublishedSnapshot {
    content: ContentSnapshot,
    media: ContentSnapshot,
    preview: bool,
    elements: ElementsCache,
}

impl PublishedSnapshot {
    /// Bundles two snapshots.
    pub fn new(content: ContentSnapshot, media: ContentSnapshot, preview: bool) -> Self {
        Self {
            content,
            media,
            preview,
            elements: ElementsCache::default(),
        }
    }

    /// Content snapshot.
    pub fn content(&self) -> &ContentSnapshot {
        &self.content
    }

    /// Media snapshot.
    pub fn media(&self) -> &ContentSnapshot {
        &self.media
    }

    /// Whether drafts are visible.
    pub fn is_preview(&self) -> bool {
        self.preview
    }

    /// Request-scoped cache.
    pub fn elements(&self) -> &ElementsCache {
        &self.elements
    }

    /// Payload of `node` visible to this request.
    pub fn data<'n>(&self, node: &'n ContentNode) -> Option<&'n Arc<ContentData>> {
        node.data(self.preview)
    }

    fn visible(&self, node: Arc<ContentNode>) -> Option<Arc<ContentNode>> {
        node.data(self.preview).is_some().then_some(node)
    }

    /// Content node `id`, if visible to this request.
    pub fn get_content(&self, id: ContentId) -> Option<Arc<ContentNode>> {
        self.content.get(id).and_then(|node| self.visible(node))
    }

    /// Visible top-level content nodes, by sort order then id.
    pub fn content_at_root(&self) -> Vec<Arc<ContentNode>> {
        self.content
            .get_at_root()
            .into_iter()
            .filter_map(|node| self.visible(node))
            .collect()
    }

    /// Visible children of content node `id`.
    pub fn content_children(&self, id: ContentId) -> Vec<Arc<ContentNode>> {
        self.content
            .children(id)
            .into_iter()
            .filter_map(|node| self.visible(node))
            .collect()
    }

    /// Media node `id`, if visible to this request.
    pub fn get_media(&self, id: ContentId) -> Option<Arc<ContentNode>> {
        self.media.get(id).and_then(|node| self.visible(node))
    }

    /// Visible top-level media nodes.
    pub fn media_at_root(&self) -> Vec<Arc<ContentNode>> {
        self.media
            .get_at_root()
            .into_iter()
            .filter_map(|node| self.visible(node))
            .collect()
    }
}

/// Owns the content and media stores and hands out request facades.
#[derive(Clone, Debug)]
pub struct PublishedSnapshotService {
    content: ContentStore,
    media: ContentStore,
}

impl PublishedSnapshotService {
    /// Creates both stores with the same options.
    pub fn new(options: StoreOptions) -> Result<Self> {
        Ok(Self {
            content: ContentStore::with_options(ItemKind::Content, options.clone())?,
            media: ContentStore::with_options(ItemKind::Media, options)?,
        })
    }

    /// Wraps existing stores.
    pub fn from_stores(content: ContentStore, media: ContentStore) -> Self {
        Self { content, media }
    }

    /// Content store.
    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    /// Media store.
    pub fn media_store(&self) -> &ContentStore {
        &self.media
    }

    /// Creates the facade of one request.
    pub fn create_published_snapshot(&self, preview: bool) -> PublishedSnapshot {
        PublishedSnapshot::new(
            self.content.create_snapshot(),
            self.media.create_snapshot(),
            preview,
        )
    }
}
