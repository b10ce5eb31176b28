// src/pipeline/mod.rs

//! Category-level pipeline: accumulation, the harvest loop, and offline
//! merge of parallel runs.

pub mod accumulator;
pub mod harvest;
pub mod merge;

pub use accumulator::{Offer, UniqueAccumulator};
pub use harvest::{HarvestLoop, HarvestOutcome, RunStats, RunStatus};
pub use merge::{MergeOutcome, MergeSource, load_source, merge_sources};
