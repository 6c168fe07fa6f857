//! State store implementations
//!
//! - [`FileStateStore`]: durable, atomic-replace file persistence
//! - [`MemoryStateStore`]: ephemeral, for tests and disposable deployments

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
