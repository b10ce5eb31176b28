//! Durable per-category harvest progress.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PhoneKey;

/// Snapshot of one category's accumulated unique set and discovery cursors.
///
/// Serialized as JSON, one file per category (and slot). Schema additions
/// must carry `#[serde(default)]` so older checkpoints keep loading; unknown
/// fields are ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestState {
    #[serde(default = "defaults::version")]
    pub version: u32,

    /// Unique keys in first-seen order
    #[serde(default)]
    pub phones: Vec<PhoneKey>,

    /// Numeric target for this category; advisory, configured per run
    #[serde(default)]
    pub target_count: usize,

    /// Next page to fetch, per discovery endpoint
    #[serde(default)]
    pub cursors: HashMap<String, u32>,

    /// When this state was last persisted
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl HarvestState {
    /// Fresh first-run state.
    pub fn empty() -> Self {
        Self {
            version: defaults::version(),
            phones: Vec::new(),
            target_count: 0,
            cursors: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn count(&self) -> usize {
        self.phones.len()
    }

    /// Resume cursor for an endpoint; discovery starts at page 1.
    pub fn cursor(&self, endpoint: &str) -> u32 {
        self.cursors.get(endpoint).copied().unwrap_or(1)
    }
}

impl Default for HarvestState {
    fn default() -> Self {
        Self::empty()
    }
}

mod defaults {
    pub fn version() -> u32 {
        1
    }
}
