//! Content tree on top of the generational engine.
//!
//! A [`ContentStore`] keeps nodes by id, root membership and content types
//! (by id and by alias) in maps sharing one generation clock, so a
//! [`ContentSnapshot`] sees all of them at the same generation. Edits arrive
//! as [`ContentKit`]s through a [`ContentWriter`].

mod model;
mod snapshot;
mod store;
mod tree;
mod types;

pub use model::{
    ContentData, ContentKit, ContentNode, ItemKind, PropertyType, PublishedContentType,
};
pub use snapshot::ContentSnapshot;
pub use store::{ContentStore, ContentWriter, StoreStats};
pub use tree::{KitOutcome, LoadReport, SkipReason};
pub use types::TypeRebuild;
