use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::{ContentId, ContentTypeId, DataTypeId};

use super::model::{ContentKit, PublishedContentType};
use super::store::ContentWriter;
use super::tree::LoadReport;

/// Summary of a content-type change.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TypeRebuild {
    /// Content types removed.
    pub removed_types: usize,
    /// Content types stored (new or changed).
    pub refreshed_types: usize,
    /// Nodes removed with their type, subtrees included.
    pub removed_nodes: usize,
    /// Nodes bound to a refreshed definition without a new kit.
    pub rebound_nodes: usize,
    /// Outcome of the supplied kits.
    pub kits: LoadReport,
}

impl<'a> ContentWriter<'a> {
    fn put_content_type(&mut self, content_type: Arc<PublishedContentType>) {
        if let Some(previous) = self.get_content_type(content_type.id) {
            if previous.alias != content_type.alias {
                self.store.types_by_alias.clear(&self.guard, previous.alias.as_str());
            }
        }
        self.store
            .types_by_id
            .set(&self.guard, content_type.id, Arc::clone(&content_type));
        self.store
            .types_by_alias
            .set(&self.guard, content_type.alias.clone(), content_type);
    }

    fn drop_content_type(&mut self, id: ContentTypeId) -> bool {
        let Some(previous) = self.get_content_type(id) else {
            return false;
        };
        self.store
            .types_by_alias
            .clear(&self.guard, previous.alias.as_str());
        self.store.types_by_id.clear(&self.guard, &id);
        true
    }

    /// Binds every node of `content_type` to it, except `skip`.
    fn rebind_nodes(
        &mut self,
        content_type: &Arc<PublishedContentType>,
        skip: &FxHashSet<ContentId>,
    ) -> usize {
        let mut rebound = 0;
        for id in self.nodes_of_type(content_type.id) {
            if skip.contains(&id) {
                continue;
            }
            if let Some(node) = self.get(id) {
                let updated = Arc::new(node.rebind(Arc::clone(content_type)));
                self.store.nodes.set(&self.guard, id, updated);
                rebound += 1;
            }
        }
        rebound
    }

    /// Replaces the whole set of content types.
    ///
    /// Types not in `types` are removed with their nodes; every other type
    /// is refreshed.
    pub fn set_all_content_types(&mut self, types: Vec<PublishedContentType>) -> TypeRebuild {
        let keep: FxHashSet<ContentTypeId> = types.iter().map(|ty| ty.id).collect();
        let removed: Vec<ContentTypeId> = self
            .store
            .types_by_id
            .live_entries(&self.guard)
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !keep.contains(id))
            .collect();
        self.update_content_types(&removed, types, Vec::new())
    }

    /// Applies a content-type schema change.
    ///
    /// Nodes of `removed` types are removed with their subtrees. `refreshed`
    /// types are stored and their nodes rebound to the new definitions;
    /// nodes with a kit in `kits` are rebuilt from the kit instead. Kits of
    /// types that are not refreshed are ignored.
    pub fn update_content_types(
        &mut self,
        removed: &[ContentTypeId],
        refreshed: Vec<PublishedContentType>,
        kits: Vec<ContentKit>,
    ) -> TypeRebuild {
        let mut rebuild = TypeRebuild::default();

        for &type_id in removed {
            let mut ids: Vec<ContentId> = self.take_type_nodes(type_id).into_iter().collect();
            ids.sort();
            for id in ids {
                // Already gone when an ancestor of the same type was removed.
                rebuild.removed_nodes += self.remove_subtree(id);
            }
            if self.drop_content_type(type_id) {
                rebuild.removed_types += 1;
            }
        }

        let refreshed: Vec<Arc<PublishedContentType>> =
            refreshed.into_iter().map(Arc::new).collect();
        for content_type in &refreshed {
            self.put_content_type(Arc::clone(content_type));
        }
        rebuild.refreshed_types = refreshed.len();

        let refreshed_ids: FxHashSet<ContentTypeId> =
            refreshed.iter().map(|ty| ty.id).collect();
        let (kits, ignored): (Vec<_>, Vec<_>) = kits
            .into_iter()
            .partition(|kit| refreshed_ids.contains(&kit.content_type_id));
        if !ignored.is_empty() {
            debug!(count = ignored.len(), "content_store.types.kits_ignored");
        }
        let rebuilt: FxHashSet<ContentId> = kits.iter().map(|kit| kit.id).collect();
        rebuild.kits = self.set_ordered(kits);

        for content_type in &refreshed {
            rebuild.rebound_nodes += self.rebind_nodes(content_type, &rebuilt);
        }

        info!(
            kind = %self.store.kind,
            generation = self.generation(),
            removed_types = rebuild.removed_types,
            refreshed_types = rebuild.refreshed_types,
            removed_nodes = rebuild.removed_nodes,
            rebound_nodes = rebuild.rebound_nodes,
            "content_store.types.updated"
        );
        rebuild
    }

    /// Refreshes every content type whose properties use one of
    /// `data_type_ids`.
    ///
    /// `resolve` receives the current definition and returns the new one, or
    /// `None` to leave it unchanged.
    pub fn update_data_types<F>(&mut self, data_type_ids: &[DataTypeId], mut resolve: F) -> TypeRebuild
    where
        F: FnMut(&PublishedContentType) -> Option<PublishedContentType>,
    {
        let mut affected: Vec<Arc<PublishedContentType>> = self
            .store
            .types_by_id
            .live_entries(&self.guard)
            .into_iter()
            .map(|(_, ty)| ty)
            .filter(|ty| data_type_ids.iter().any(|dt| ty.uses_data_type(*dt)))
            .collect();
        affected.sort_by_key(|ty| ty.id);
        let refreshed: Vec<PublishedContentType> =
            affected.iter().filter_map(|ty| resolve(ty)).collect();
        self.update_content_types(&[], refreshed, Vec::new())
    }
}
