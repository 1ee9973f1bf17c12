//! drydock-store: Persistence contracts and an in-memory implementation
//!
//! The engine depends only on the repository traits. `MemoryStore` implements
//! all of them behind a single lock so a config upsert lands atomically.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use memory::{MemoryStore, RESOURCE_HISTORY_LIMIT};
pub use traits::{
    AgentLockRepository, ArtifactRepository, DeliveryConfigRepository, DiffFingerprintRepository,
    PausedRepository, ResourceRepository, Store,
};
pub use types::{
    ApprovalQueue, ConfigChangeSet, EnvironmentKey, ResourceChange, ResourceHistoryEntry,
};
