//! Replication across the nodes a key resolves to.

mod backing_store;
mod coordinator;

pub use backing_store::{BackingStore, MemoryBackingStore};
pub use coordinator::{ReadOutcome, RemoveOutcome, ReplicationCoordinator, WriteOutcome};
