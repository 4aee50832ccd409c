//! Identifier newtypes, the generation counter and the crate error type.

use std::fmt;

/// Version counter shared by every map of a store.
///
/// Generation `0` is the empty store; the first write opens generation `1`.
pub type Generation = u64;

/// Identifier of a content or media node.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ContentId(pub u32);

/// Identifier of a content-type definition.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ContentTypeId(pub u32);

/// Identifier of a data type referenced by property types.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct DataTypeId(pub u32);

/// Errors surfaced by the fallible, non-engine parts of the crate.
///
/// Structural problems with kits are not errors: they are reported as skips.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Underlying filesystem failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed kit dump.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed options file.
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
    /// Caller supplied an unusable value.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ContentId {
    fn from(value: u32) -> Self {
        ContentId(value)
    }
}

impl From<u32> for ContentTypeId {
    fn from(value: u32) -> Self {
        ContentTypeId(value)
    }
}

impl From<u32> for DataTypeId {
    fn from(value: u32) -> Self {
        DataTypeId(value)
    }
}
