// src/storage/mod.rs

//! Checkpoint persistence for harvest state.
//!
//! One JSON file per category (and optional slot) under the storage root:
//!
//! ```text
//! storage/
//! ├── config.toml           # Harvester configuration
//! ├── agents.json           # Agent checkpoint
//! ├── owners.json           # Owner checkpoint
//! └── owners-turbo.json     # Parallel-run slot, reconciled by `merge`
//! ```

pub mod export;
pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Category, HarvestState};

// Re-export for convenience
pub use local::LocalCheckpointStore;

/// Durable record of a category's accumulated keys and discovery cursors.
///
/// The store is the single serialization point between concurrent harvest
/// processes on the same category; each process gets its own slot and slots
/// are reconciled offline.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the state for a category. Missing storage yields the empty
    /// initial state (first-run bootstrap), never an error.
    async fn load(&self, category: Category) -> Result<HarvestState>;

    /// Atomically overwrite the state for a category. A crash mid-persist
    /// leaves either the previous or the new complete state, never a
    /// truncated mixture.
    async fn persist(&self, category: Category, state: &HarvestState) -> Result<()>;
}
