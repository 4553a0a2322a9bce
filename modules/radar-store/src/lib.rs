//! Postgres persistence for the radar pipeline.
//!
//! The database is the single source of truth: entities, the append-only
//! state history, and the work-in-flight job queue all live here. The
//! key-value counter store (rate limits, circuit breaker) lives in
//! [`kv`] and is never authoritative.

pub mod alerts;
pub mod anchors;
pub mod db;
pub mod documents;
pub mod events;
pub mod feedback;
pub mod fetches;
pub mod kv;
pub mod merges;
pub mod queue;
pub mod sources;

pub use db::Store;
pub use kv::{CounterStore, MemoryCounters, RedisCounters};
