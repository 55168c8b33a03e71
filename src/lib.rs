//! Purpose: Typed persistent key/value map stored in one SQLite table.
//! Exports: `api` (stable surface) and `core` (building blocks).
//! Role: Library behind the `sqlitemap` CLI; callers should use `api`.
//! Invariants: One map owns exactly one connection; concurrency is SQLite's.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
