//! Low-level primitives for building the store engine.

/// Concurrency primitives and synchronization.
///
/// The single-writer generation clock shared by every map of a store.
pub mod concurrency;
