// src/services/mod.rs

//! Network-facing services: discovery, fetch and extraction.

pub mod discovery;
pub mod extract;
pub mod fetch;

pub use discovery::{AgentSource, BROKERS_ENDPOINT, OwnerSource, TargetPage, TargetSource};
pub use extract::{Candidate, Extractor, Strategy};
pub use fetch::{
    BackoffPolicy, Delay, Fetcher, HttpRender, RenderTransport, TargetFetcher, TokioDelay,
};
