//! Work-unit types: categories and fetch targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Phone category. Each category has its own accumulator, target count and
/// checkpoint slot; the same digit string may legitimately appear in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Agent,
    Owner,
}

impl Category {
    /// Stable name used for checkpoint files and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Agent => "agents",
            Category::Owner => "owners",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" | "agents" => Ok(Category::Agent),
            "owner" | "owners" => Ok(Category::Owner),
            other => Err(format!("unknown category '{other}' (use agents or owners)")),
        }
    }
}

/// Which discovery endpoint and page produced a target. Kept for diagnosing
/// yield per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOrigin {
    pub endpoint: String,
    pub page: u32,
}

/// One unit of work: an agent ID or a property URL to fetch and extract from.
#[derive(Debug, Clone)]
pub struct Target {
    /// Agent ID (agents) or absolute property URL (owners)
    pub id: String,
    pub category: Category,
    pub origin: TargetOrigin,
    /// Statement UUID captured during owner discovery; lets the fetcher use
    /// the phone API instead of the property page
    pub uuid: Option<String>,
}

impl Target {
    pub fn new(id: impl Into<String>, category: Category, origin: TargetOrigin) -> Self {
        Self {
            id: id.into(),
            category,
            origin,
            uuid: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }
}
