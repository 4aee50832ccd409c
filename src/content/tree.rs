//! Structural edits of the content tree.
//!
//! Nodes only hold child ids. Attaching a child to a parent or detaching it
//! writes a fresh copy of the parent, so snapshots of earlier generations
//! keep the parent shape they were taken with.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::types::ContentId;

use super::model::{ContentKit, ContentNode};
use super::store::ContentWriter;

/// Why a kit was not applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The kit has neither a draft nor a published payload.
    EmptyKit,
    /// The content type is unknown.
    MissingContentType,
    /// The kit names itself as its parent.
    SelfParent,
    /// The parent does not exist.
    MissingParent,
    /// The parent is a descendant of the node.
    Cycle,
}

impl SkipReason {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::EmptyKit => "empty_kit",
            SkipReason::MissingContentType => "missing_content_type",
            SkipReason::SelfParent => "self_parent",
            SkipReason::MissingParent => "missing_parent",
            SkipReason::Cycle => "cycle",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one kit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KitOutcome {
    /// The node did not exist before.
    Inserted,
    /// The node was replaced under the same parent.
    Updated,
    /// The node was replaced under a different parent.
    Moved,
    /// Nothing was written.
    Skipped(SkipReason),
}

impl KitOutcome {
    /// True unless the kit was skipped.
    pub fn is_applied(&self) -> bool {
        !matches!(self, KitOutcome::Skipped(_))
    }
}

/// Summary of applying a batch of kits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LoadReport {
    /// Kits applied.
    pub applied: usize,
    /// Kits skipped, for any reason.
    pub skipped: usize,
    /// Kits skipped because their parent was missing.
    pub missing_parent: usize,
    /// Kits skipped because their content type was unknown.
    pub missing_content_type: usize,
}

impl LoadReport {
    pub(crate) fn record(&mut self, outcome: KitOutcome) {
        match outcome {
            KitOutcome::Skipped(reason) => {
                self.skipped += 1;
                match reason {
                    SkipReason::MissingParent => self.missing_parent += 1,
                    SkipReason::MissingContentType => self.missing_content_type += 1,
                    _ => {}
                }
            }
            _ => self.applied += 1,
        }
    }
}

impl<'a> ContentWriter<'a> {
    /// Inserts or replaces the node described by `kit`.
    ///
    /// Structurally invalid kits are skipped, never partially applied.
    pub fn set(&mut self, kit: ContentKit) -> KitOutcome {
        let id = kit.id;
        let parent_id = kit.parent_id;
        let content_type_id = kit.content_type_id;
        let outcome = match self.try_set(kit) {
            Ok(outcome) => outcome,
            Err(reason) => KitOutcome::Skipped(reason),
        };
        match outcome {
            KitOutcome::Skipped(reason) => {
                warn!(
                    kind = %self.store.kind,
                    id = id.0,
                    parent = parent_id.map(|p| p.0),
                    content_type = content_type_id.0,
                    reason = reason.as_str(),
                    "content_store.kit.skipped"
                );
                self.store.metrics.kit_skipped(reason.as_str());
            }
            applied => {
                trace!(id = id.0, outcome = ?applied, "content_store.kit.applied");
                self.store.metrics.kit_applied();
            }
        }
        outcome
    }

    fn try_set(&mut self, kit: ContentKit) -> Result<KitOutcome, SkipReason> {
        if kit.is_empty() {
            return Err(SkipReason::EmptyKit);
        }
        let content_type = self
            .get_content_type(kit.content_type_id)
            .ok_or(SkipReason::MissingContentType)?;
        if let Some(parent) = kit.parent_id {
            if parent == kit.id {
                return Err(SkipReason::SelfParent);
            }
            if self.get(parent).is_none() {
                return Err(SkipReason::MissingParent);
            }
            if self.is_ancestor(kit.id, parent) {
                return Err(SkipReason::Cycle);
            }
        }

        let id = kit.id;
        let existing = self.get(id);
        let child_ids = existing
            .as_ref()
            .map(|node| node.child_id_list())
            .unwrap_or_default();
        let node = Arc::new(ContentNode::from_kit(kit, content_type, child_ids));

        if let Some(previous) = &existing {
            if previous.content_type_id() != node.content_type_id() {
                self.unindex_node(previous.content_type_id(), id);
            }
        }
        self.index_node(node.content_type_id(), id);
        self.store.nodes.set(&self.guard, id, Arc::clone(&node));

        Ok(match existing {
            None => {
                self.attach(id, node.parent_id());
                KitOutcome::Inserted
            }
            Some(previous) if previous.parent_id() != node.parent_id() => {
                self.detach(id, previous.parent_id());
                self.attach(id, node.parent_id());
                KitOutcome::Moved
            }
            Some(_) => KitOutcome::Updated,
        })
    }

    /// True when `ancestor` is `id` or one of its ancestors, at the live view.
    fn is_ancestor(&self, ancestor: ContentId, id: ContentId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.get(current).and_then(|node| node.parent_id());
        }
        false
    }

    fn attach(&mut self, id: ContentId, parent: Option<ContentId>) {
        match parent {
            None => self.store.roots.set(&self.guard, id, ()),
            Some(parent_id) => {
                if let Some(parent) = self.get(parent_id) {
                    let updated = Arc::new(parent.with_child(id));
                    self.store.nodes.set(&self.guard, parent_id, updated);
                }
            }
        }
    }

    fn detach(&mut self, id: ContentId, parent: Option<ContentId>) {
        match parent {
            None => self.store.roots.clear(&self.guard, &id),
            Some(parent_id) => {
                if let Some(parent) = self.get(parent_id) {
                    let updated = Arc::new(parent.without_child(id));
                    self.store.nodes.set(&self.guard, parent_id, updated);
                }
            }
        }
    }

    /// Removes node `id` and its whole subtree.
    ///
    /// Returns `false` when the node does not exist.
    pub fn clear(&mut self, id: ContentId) -> bool {
        self.remove_subtree(id) > 0
    }

    /// Removes node `id` and its subtree, returning the number of nodes
    /// removed.
    pub(crate) fn remove_subtree(&mut self, id: ContentId) -> usize {
        let Some(node) = self.get(id) else {
            return 0;
        };
        self.detach(id, node.parent_id());
        let removed = self.clear_subtree(node);
        debug!(kind = %self.store.kind, id = id.0, removed, "content_store.remove");
        removed
    }

    fn clear_subtree(&mut self, top: Arc<ContentNode>) -> usize {
        let mut removed = 0;
        let mut pending = vec![top];
        while let Some(node) = pending.pop() {
            pending.extend(node.child_ids().iter().filter_map(|child| self.get(*child)));
            self.unindex_node(node.content_type_id(), node.id());
            self.store.nodes.clear(&self.guard, &node.id());
            removed += 1;
        }
        removed
    }

    /// Replaces the whole tree with `kits`, parents first.
    pub fn set_all(&mut self, kits: Vec<ContentKit>) -> LoadReport {
        self.store.nodes.clear_all(&self.guard);
        self.store.roots.clear_all(&self.guard);
        self.clear_index();
        let report = self.set_ordered(kits);
        debug!(
            kind = %self.store.kind,
            generation = self.generation(),
            applied = report.applied,
            skipped = report.skipped,
            "content_store.load.done"
        );
        report
    }

    /// Replaces the branch rooted at `root_id` with `kits`, parents first.
    ///
    /// `kits` normally starts with the kit of `root_id` itself.
    pub fn set_branch(&mut self, root_id: ContentId, kits: Vec<ContentKit>) -> LoadReport {
        self.clear(root_id);
        self.set_ordered(kits)
    }

    pub(crate) fn set_ordered(&mut self, mut kits: Vec<ContentKit>) -> LoadReport {
        kits.sort_by_key(|kit| kit.level);
        let mut report = LoadReport::default();
        for kit in kits {
            let outcome = self.set(kit);
            report.record(outcome);
        }
        report
    }

    /// Child ids of `id` at the live view.
    pub fn child_ids(&self, id: ContentId) -> Vec<ContentId> {
        self.get(id)
            .map(|node| node.child_ids().to_vec())
            .unwrap_or_default()
    }
}
