#![forbid(unsafe_code)]

//! Operator tooling behind the `cli` binary.
//!
//! Kit dumps, synthetic trees, the churn workload and tree rendering live
//! here so they can be tested without spawning the binary.

/// Writer/reader churn workload.
pub mod churn;

/// Kit dump files and synthetic trees.
pub mod dump;

use serde::Serialize;

use crate::content::{ContentNode, ContentSnapshot};
use crate::types::{ContentId, ContentTypeId};

/// One node of a rendered tree.
#[derive(Clone, Debug, Serialize)]
pub struct TreeEntry {
    /// Node id.
    pub id: ContentId,
    /// Name of the payload shown, if any.
    pub name: Option<String>,
    /// Content type id.
    pub content_type: ContentTypeId,
    /// Content type alias.
    pub content_type_alias: String,
    /// Position among siblings.
    pub sort_order: i32,
    /// Whether a published payload exists.
    pub published: bool,
    /// Children, by sort order then id.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

/// Renders the tree visible to `snapshot`, down to `max_depth` levels.
pub fn tree_view(snapshot: &ContentSnapshot, preview: bool, max_depth: Option<u32>) -> Vec<TreeEntry> {
    snapshot
        .get_at_root()
        .iter()
        .map(|node| tree_entry(snapshot, node, preview, 1, max_depth))
        .collect()
}

fn tree_entry(
    snapshot: &ContentSnapshot,
    node: &ContentNode,
    preview: bool,
    depth: u32,
    max_depth: Option<u32>,
) -> TreeEntry {
    let children = if max_depth.is_some_and(|max| depth >= max) {
        Vec::new()
    } else {
        snapshot
            .children(node.id())
            .iter()
            .map(|child| tree_entry(snapshot, child, preview, depth + 1, max_depth))
            .collect()
    };
    TreeEntry {
        id: node.id(),
        name: node.name(preview).map(str::to_owned),
        content_type: node.content_type_id(),
        content_type_alias: node.content_type().alias.clone(),
        sort_order: node.sort_order(),
        published: node.published().is_some(),
        children,
    }
}

/// Writes `entries` as an indented outline.
pub fn write_tree_text(out: &mut impl std::io::Write, entries: &[TreeEntry]) -> std::io::Result<()> {
    fn walk(out: &mut impl std::io::Write, entry: &TreeEntry, indent: usize) -> std::io::Result<()> {
        writeln!(
            out,
            "{:indent$}- [{}] {} ({}){}",
            "",
            entry.id,
            entry.name.as_deref().unwrap_or("<no payload>"),
            entry.content_type_alias,
            if entry.published { "" } else { " draft" },
            indent = indent * 2
        )?;
        for child in &entry.children {
            walk(out, child, indent + 1)?;
        }
        Ok(())
    }
    for entry in entries {
        walk(out, entry, 0)?;
    }
    Ok(())
}
