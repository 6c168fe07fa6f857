//! Event log implementations
//!
//! The durable SQLite-backed log lives in the `ipwatch-log-sqlite` crate;
//! this module provides the in-memory implementation.

pub mod memory;

pub use memory::MemoryEventLog;
