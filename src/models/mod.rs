// src/models/mod.rs

//! Domain models for the harvester.

mod config;
pub mod phone;
mod state;
mod target;

// Re-export all public types
pub use config::{
    AgentSourceConfig, BackoffConfig, Config, HttpConfig, OwnerSourceConfig, RenderConfig,
};
pub use phone::PhoneKey;
pub use state::HarvestState;
pub use target::{Category, Target, TargetOrigin};
