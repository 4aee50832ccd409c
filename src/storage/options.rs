use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{CacheError, Result};

use super::metrics::StoreMetrics;

/// Default thread name for background collection passes.
pub const DEFAULT_COLLECTOR_THREAD: &str = "contentcache-collect";

/// Configuration options supplied when creating a store.
#[derive(Clone)]
pub struct StoreOptions {
    /// Background collection configuration.
    pub collect: CollectCfg,
    /// Name given to collector threads.
    pub collector_thread_name: String,
    /// Optional metrics collection implementation
    pub metrics: Option<Arc<dyn StoreMetrics>>,
}

impl StoreOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self {
            collect: CollectCfg::default(),
            collector_thread_name: DEFAULT_COLLECTOR_THREAD.to_string(),
            metrics: None,
        }
    }

    /// Sets the collection configuration.
    pub fn collect(mut self, cfg: CollectCfg) -> Self {
        self.collect = cfg;
        self
    }

    /// Enables or disables collection at snapshot creation.
    pub fn auto_collect(mut self, enabled: bool) -> Self {
        self.collect.auto = enabled;
        self
    }

    /// Sets the generation lag that triggers an automatic pass.
    pub fn min_gen_delta(mut self, delta: u64) -> Self {
        self.collect.min_gen_delta = delta;
        self
    }

    /// Sets the collector thread name.
    pub fn collector_thread_name(mut self, name: impl Into<String>) -> Self {
        self.collector_thread_name = name.into();
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Checks values that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<()> {
        if self.collector_thread_name.trim().is_empty() {
            return Err(CacheError::Invalid("collector thread name is empty"));
        }
        if self.collector_thread_name.contains('\0') {
            return Err(CacheError::Invalid("collector thread name contains NUL"));
        }
        Ok(())
    }

    /// Parses options from TOML.
    ///
    /// ```toml
    /// collector_thread_name = "media-collect"
    ///
    /// [collect]
    /// auto = true
    /// min_gen_delta = 8
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(source)?;
        let mut options = Self::new();
        if let Some(collect) = raw.collect {
            options.collect = collect;
        }
        if let Some(name) = raw.collector_thread_name {
            options.collector_thread_name = name;
        }
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("collect", &self.collect)
            .field("collector_thread_name", &self.collector_thread_name)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for collection of superseded versions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectCfg {
    /// Whether snapshot creation may start a background pass.
    pub auto: bool,
    /// Minimum `live - floor` lag before an automatic pass starts.
    pub min_gen_delta: u64,
}

impl Default for CollectCfg {
    fn default() -> Self {
        Self {
            auto: true,
            min_gen_delta: 4,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    collect: Option<CollectCfg>,
    collector_thread_name: Option<String>,
}
