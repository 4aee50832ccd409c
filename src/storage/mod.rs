//! Generational storage engine.
//!
//! Version chains keyed in concurrent maps, a single writer per store, read
//! views pinned to a generation and background reclamation of versions no
//! view can observe.

mod chain;
pub(crate) mod collector;
pub(crate) mod gen_map;
mod metrics;
mod options;
mod snap_dictionary;

/// Statistics of a collection pass.
pub use collector::CollectStats;

/// Metrics and instrumentation.
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StoreMetrics};

/// Store configuration options.
pub use options::{CollectCfg, StoreOptions, DEFAULT_COLLECTOR_THREAD};

/// Standalone snapshot-isolated dictionary.
pub use snap_dictionary::{DictSnapshot, DictWriter, SnapDictionary};
