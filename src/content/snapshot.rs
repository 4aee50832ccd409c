use std::fmt;
use std::sync::Arc;

use crate::primitives::concurrency::GenRef;
use crate::types::{ContentId, ContentTypeId, Generation};

use super::model::{ContentNode, ItemKind, PublishedContentType};
use super::store::StoreInner;

/// Read view of a [`ContentStore`](super::ContentStore) pinned to one
/// generation.
///
/// All reads are lock-free and return the same answers for the lifetime of
/// the snapshot, whatever the writer does meanwhile. Holding any clone keeps
/// the generation observable; dropping the last one lets the collector
/// reclaim it.
#[derive(Clone)]
pub struct ContentSnapshot {
    reference: Arc<GenRef>,
    store: Arc<StoreInner>,
}

impl fmt::Debug for ContentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSnapshot")
            .field("kind", &self.store.kind)
            .field("generation", &self.reference.generation())
            .finish()
    }
}

fn sort_siblings(nodes: &mut [Arc<ContentNode>]) {
    nodes.sort_by_key(|node| (node.sort_order(), node.id()));
}

impl ContentSnapshot {
    pub(crate) fn new(reference: Arc<GenRef>, store: Arc<StoreInner>) -> Self {
        Self { reference, store }
    }

    /// Pinned generation.
    pub fn generation(&self) -> Generation {
        self.reference.generation()
    }

    /// Kind of items held by the store.
    pub fn kind(&self) -> ItemKind {
        self.store.kind
    }

    /// True when both handles share one issued reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reference, &other.reference)
    }

    /// Node `id`.
    pub fn get(&self, id: ContentId) -> Option<Arc<ContentNode>> {
        self.store.nodes.get(&id, self.generation())
    }

    /// Top-level nodes, by sort order then id.
    pub fn get_at_root(&self) -> Vec<Arc<ContentNode>> {
        let generation = self.generation();
        let mut roots: Vec<Arc<ContentNode>> = self
            .store
            .roots
            .entries_at(generation)
            .into_iter()
            .filter_map(|(id, ())| self.store.nodes.get(&id, generation))
            .collect();
        sort_siblings(&mut roots);
        roots
    }

    /// Direct children of `id`, by sort order then id.
    pub fn children(&self, id: ContentId) -> Vec<Arc<ContentNode>> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<Arc<ContentNode>> = node
            .child_ids()
            .iter()
            .filter_map(|child| self.get(*child))
            .collect();
        sort_siblings(&mut children);
        children
    }

    /// Parent of `id`, `None` at the top level or when `id` is absent.
    pub fn parent(&self, id: ContentId) -> Option<Arc<ContentNode>> {
        self.get(id)?.parent_id().and_then(|parent| self.get(parent))
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: ContentId) -> Vec<Arc<ContentNode>> {
        let mut out = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(node) = cursor {
            cursor = node.parent_id().and_then(|parent| self.get(parent));
            out.push(node);
        }
        out
    }

    /// Every node, by level, then sort order, then id.
    pub fn get_all(&self) -> Vec<Arc<ContentNode>> {
        let mut nodes: Vec<Arc<ContentNode>> = self
            .store
            .nodes
            .entries_at(self.generation())
            .into_iter()
            .map(|(_, node)| node)
            .collect();
        nodes.sort_by_key(|node| (node.level(), node.sort_order(), node.id()));
        nodes
    }

    /// True when the snapshot holds no node.
    pub fn is_empty(&self) -> bool {
        self.store.nodes.is_empty_at(self.generation())
    }

    /// Content type `id`.
    pub fn get_content_type(&self, id: ContentTypeId) -> Option<Arc<PublishedContentType>> {
        self.store.types_by_id.get(&id, self.generation())
    }

    /// Content type by alias.
    pub fn get_content_type_by_alias(&self, alias: &str) -> Option<Arc<PublishedContentType>> {
        self.store.types_by_alias.get(alias, self.generation())
    }

    /// Every content type, by id.
    pub fn content_types(&self) -> Vec<Arc<PublishedContentType>> {
        let mut types: Vec<Arc<PublishedContentType>> = self
            .store
            .types_by_id
            .entries_at(self.generation())
            .into_iter()
            .map(|(_, ty)| ty)
            .collect();
        types.sort_by_key(|ty| ty.id);
        types
    }
}
