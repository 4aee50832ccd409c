use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::{
    ContentData, ContentKit, ContentStore, ItemKind, LoadReport, PublishedContentType, TypeRebuild,
};
use crate::types::{CacheError, ContentId, ContentTypeId, DataTypeId, Result};

/// Content types and kits of one store, as exchanged with the CLI.
///
/// ```json
/// { "content_types": [ ... ], "kits": [ ... ] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KitDump {
    /// Content-type definitions.
    #[serde(default)]
    pub content_types: Vec<PublishedContentType>,
    /// Node kits, in any order.
    #[serde(default)]
    pub kits: Vec<ContentKit>,
}

/// Shape of a generated tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyntheticTree {
    /// Top-level nodes.
    pub roots: u32,
    /// Children per inner node.
    pub fanout: u32,
    /// Levels, 1 meaning roots only.
    pub depth: u32,
}

impl SyntheticTree {
    /// Number of nodes the tree holds.
    pub fn node_count(&self) -> u64 {
        let mut level = u64::from(self.roots);
        let mut total = 0u64;
        for _ in 0..self.depth {
            total = total.saturating_add(level);
            level = level.saturating_mul(u64::from(self.fanout));
        }
        total
    }
}

/// Content type of generated inner nodes.
pub const FOLDER_TYPE: ContentTypeId = ContentTypeId(1);
/// Content type of generated leaves.
pub const PAGE_TYPE: ContentTypeId = ContentTypeId(2);

const MAX_SYNTHETIC_NODES: u64 = 1_000_000;

impl KitDump {
    /// Parses a dump from JSON text.
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Reads a dump file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Writes the dump as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Builds a complete tree: folders on every level but the last, pages
    /// on the last one.
    pub fn synthetic(shape: SyntheticTree) -> Result<Self> {
        if shape.roots == 0 || shape.depth == 0 {
            return Err(CacheError::Invalid("synthetic tree needs roots and depth"));
        }
        if shape.node_count() > MAX_SYNTHETIC_NODES {
            return Err(CacheError::Invalid("synthetic tree is too large"));
        }
        let content_types = vec![
            PublishedContentType::new(FOLDER_TYPE, "folder", ItemKind::Content),
            PublishedContentType::new(PAGE_TYPE, "page", ItemKind::Content)
                .with_property("title", DataTypeId(1), "textbox")
                .with_property("body", DataTypeId(2), "richtext"),
        ];

        let mut kits = Vec::new();
        let mut next_id = 1u32;
        let mut level: Vec<ContentKit> = Vec::new();
        for sort in 0..shape.roots {
            level.push(synthetic_kit(&mut next_id, None, sort, shape.depth == 1));
        }
        for depth in 2..=shape.depth {
            let leaf = depth == shape.depth;
            let mut next_level = Vec::new();
            for parent in &level {
                for sort in 0..shape.fanout {
                    next_level.push(synthetic_kit(&mut next_id, Some(parent), sort, leaf));
                }
            }
            kits.append(&mut level);
            level = next_level;
        }
        kits.append(&mut level);
        Ok(Self {
            content_types,
            kits,
        })
    }

    /// Replaces the content of `store` with this dump.
    pub fn apply_to(&self, store: &ContentStore) -> (TypeRebuild, LoadReport) {
        let mut writer = store.write();
        let types = writer.set_all_content_types(self.content_types.clone());
        let report = writer.set_all(self.kits.clone());
        (types, report)
    }
}

fn synthetic_kit(
    next_id: &mut u32,
    parent: Option<&ContentKit>,
    sort_order: u32,
    leaf: bool,
) -> ContentKit {
    let id = ContentId(*next_id);
    *next_id += 1;
    let (content_type, name) = if leaf {
        (PAGE_TYPE, format!("Page {id}"))
    } else {
        (FOLDER_TYPE, format!("Folder {id}"))
    };
    let mut data = ContentData::new(name.clone(), 1, true);
    if leaf {
        data = data
            .with_property("title", serde_json::Value::String(name))
            .with_property("body", serde_json::Value::String(String::new()));
    }
    let kit = ContentKit::new(id, content_type)
        .with_sort_order(i32::try_from(sort_order).unwrap_or(i32::MAX))
        .with_published(data);
    match parent {
        Some(parent) => kit.under(parent),
        None => kit,
    }
}
