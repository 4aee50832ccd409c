use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{ContentId, ContentTypeId, DataTypeId};

/// Kind of published item a content type describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Document content.
    Content,
    /// Media items.
    Media,
    /// Members.
    Member,
    /// Element types nested inside other content.
    Element,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Content => "content",
            ItemKind::Media => "media",
            ItemKind::Member => "member",
            ItemKind::Element => "element",
        };
        f.write_str(name)
    }
}

/// Property descriptor of a content type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PropertyType {
    /// Property alias, unique within the content type.
    pub alias: String,
    /// Data type backing the property.
    pub data_type_id: DataTypeId,
    /// Alias of the property editor.
    pub editor_alias: String,
}

/// Published content-type definition.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublishedContentType {
    /// Content type id.
    pub id: ContentTypeId,
    /// Unique alias.
    pub alias: String,
    /// Kind of items of this type.
    pub kind: ItemKind,
    /// Property descriptors in declaration order.
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
}

impl PublishedContentType {
    /// Creates a type without properties.
    pub fn new(id: ContentTypeId, alias: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            alias: alias.into(),
            kind,
            property_types: Vec::new(),
        }
    }

    /// Appends a property descriptor.
    pub fn with_property(
        mut self,
        alias: impl Into<String>,
        data_type_id: DataTypeId,
        editor_alias: impl Into<String>,
    ) -> Self {
        self.property_types.push(PropertyType {
            alias: alias.into(),
            data_type_id,
            editor_alias: editor_alias.into(),
        });
        self
    }

    /// Descriptor of the property called `alias`.
    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types.iter().find(|p| p.alias == alias)
    }

    /// True when any property is backed by `data_type_id`.
    pub fn uses_data_type(&self, data_type_id: DataTypeId) -> bool {
        self.property_types
            .iter()
            .any(|p| p.data_type_id == data_type_id)
    }
}

/// Versioned payload of a node: one draft or published revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentData {
    /// Display name.
    pub name: String,
    /// Version id in the system of record.
    pub version_id: u32,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub version_date: OffsetDateTime,
    /// Id of the last editor.
    pub writer_id: u32,
    /// Template used for rendering, if any.
    #[serde(default)]
    pub template_id: Option<u32>,
    /// Whether this revision is the published one.
    pub published: bool,
    /// Property values keyed by property alias.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ContentData {
    /// Creates a payload stamped with the current time.
    pub fn new(name: impl Into<String>, version_id: u32, published: bool) -> Self {
        Self {
            name: name.into(),
            version_id,
            version_date: OffsetDateTime::now_utc(),
            writer_id: 0,
            template_id: None,
            published,
            properties: BTreeMap::new(),
        }
    }

    /// Sets one property value.
    pub fn with_property(mut self, alias: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(alias.into(), value);
        self
    }
}

/// Node description pushed to the store by the editorial layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentKit {
    /// Node id.
    pub id: ContentId,
    /// Globally unique key.
    pub key: Uuid,
    /// Parent id, `None` for top-level nodes.
    #[serde(default)]
    pub parent_id: Option<ContentId>,
    /// Content type id.
    pub content_type_id: ContentTypeId,
    /// Depth in the tree, 1 for top-level nodes.
    pub level: u32,
    /// Materialized path of ids, comma separated, starting at `-1`.
    pub path: String,
    /// Position among siblings.
    pub sort_order: i32,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    /// Id of the creator.
    pub creator_id: u32,
    /// Draft payload.
    #[serde(default)]
    pub draft: Option<ContentData>,
    /// Published payload.
    #[serde(default)]
    pub published: Option<ContentData>,
}

impl ContentKit {
    /// Creates a top-level kit with a random key and no payloads.
    pub fn new(id: ContentId, content_type_id: ContentTypeId) -> Self {
        Self {
            id,
            key: Uuid::new_v4(),
            parent_id: None,
            content_type_id,
            level: 1,
            path: format!("-1,{id}"),
            sort_order: 0,
            create_date: OffsetDateTime::now_utc(),
            creator_id: 0,
            draft: None,
            published: None,
        }
    }

    /// Places the kit below `parent`, deriving level and path from it.
    pub fn under(mut self, parent: &ContentKit) -> Self {
        self.parent_id = Some(parent.id);
        self.level = parent.level + 1;
        self.path = format!("{},{}", parent.path, self.id);
        self
    }

    /// Moves the kit to the top level.
    pub fn at_root(mut self) -> Self {
        self.parent_id = None;
        self.level = 1;
        self.path = format!("-1,{}", self.id);
        self
    }

    /// Sets the position among siblings.
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Sets the draft payload.
    pub fn with_draft(mut self, data: ContentData) -> Self {
        self.draft = Some(data);
        self
    }

    /// Sets the published payload.
    pub fn with_published(mut self, data: ContentData) -> Self {
        self.published = Some(data);
        self
    }

    /// True when the kit carries no payload at all.
    pub fn is_empty(&self) -> bool {
        self.draft.is_none() && self.published.is_none()
    }
}

pub(crate) type ChildIds = SmallVec<[ContentId; 8]>;

/// Node of the content tree, as stored in a generation.
///
/// Nodes are immutable. Edits produce a new node sharing payloads with the
/// previous one.
#[derive(Clone, Debug)]
pub struct ContentNode {
    id: ContentId,
    key: Uuid,
    content_type: Arc<PublishedContentType>,
    level: u32,
    path: String,
    sort_order: i32,
    parent_id: Option<ContentId>,
    create_date: OffsetDateTime,
    creator_id: u32,
    child_ids: ChildIds,
    draft: Option<Arc<ContentData>>,
    published: Option<Arc<ContentData>>,
}

impl ContentNode {
    pub(crate) fn from_kit(
        kit: ContentKit,
        content_type: Arc<PublishedContentType>,
        child_ids: ChildIds,
    ) -> Self {
        Self {
            id: kit.id,
            key: kit.key,
            content_type,
            level: kit.level,
            path: kit.path,
            sort_order: kit.sort_order,
            parent_id: kit.parent_id,
            create_date: kit.create_date,
            creator_id: kit.creator_id,
            child_ids,
            draft: kit.draft.map(Arc::new),
            published: kit.published.map(Arc::new),
        }
    }

    /// Copy bound to another definition of its content type.
    pub(crate) fn rebind(&self, content_type: Arc<PublishedContentType>) -> Self {
        Self {
            content_type,
            ..self.clone()
        }
    }

    pub(crate) fn with_child(&self, child: ContentId) -> Self {
        let mut node = self.clone();
        if !node.child_ids.contains(&child) {
            node.child_ids.push(child);
        }
        node
    }

    pub(crate) fn without_child(&self, child: ContentId) -> Self {
        let mut node = self.clone();
        node.child_ids.retain(|id| *id != child);
        node
    }

    pub(crate) fn child_id_list(&self) -> ChildIds {
        self.child_ids.clone()
    }

    /// Node id.
    pub fn id(&self) -> ContentId {
        self.id
    }

    /// Globally unique key.
    pub fn key(&self) -> Uuid {
        self.key
    }

    /// Bound content-type definition.
    pub fn content_type(&self) -> &Arc<PublishedContentType> {
        &self.content_type
    }

    /// Id of the bound content type.
    pub fn content_type_id(&self) -> ContentTypeId {
        self.content_type.id
    }

    /// Depth in the tree.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Materialized path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Position among siblings.
    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    /// Parent id, `None` at the top level.
    pub fn parent_id(&self) -> Option<ContentId> {
        self.parent_id
    }

    /// Creation time.
    pub fn create_date(&self) -> OffsetDateTime {
        self.create_date
    }

    /// Id of the creator.
    pub fn creator_id(&self) -> u32 {
        self.creator_id
    }

    /// Ids of the direct children, in insertion order.
    pub fn child_ids(&self) -> &[ContentId] {
        &self.child_ids
    }

    /// Draft payload.
    pub fn draft(&self) -> Option<&Arc<ContentData>> {
        self.draft.as_ref()
    }

    /// Published payload.
    pub fn published(&self) -> Option<&Arc<ContentData>> {
        self.published.as_ref()
    }

    /// Payload seen by a reader: the draft first in preview, else the
    /// published one.
    pub fn data(&self, preview: bool) -> Option<&Arc<ContentData>> {
        if preview {
            self.draft.as_ref().or(self.published.as_ref())
        } else {
            self.published.as_ref()
        }
    }

    /// Name of the payload seen by a reader.
    pub fn name(&self, preview: bool) -> Option<&str> {
        self.data(preview).map(|data| data.name.as_str())
    }
}
