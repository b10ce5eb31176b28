// src/services/discovery.rs

//! Target discovery for the two harvest categories.
//!
//! Sources produce lazy, finite, restartable sequences of fetch targets.
//! Discovery cursors live in [`HarvestState`]; a source hands the *next*
//! cursor back with every page and the harvest loop records it only after
//! the page's targets have been fully processed, so a crash mid-page
//! re-fetches that page instead of skipping it. Duplicate targets are
//! harmless because the accumulator is idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    AgentSourceConfig, Category, HarvestState, OwnerSourceConfig, Target, TargetOrigin,
};
use crate::services::Fetcher;

/// Cursor name for the broker listing endpoint.
pub const BROKERS_ENDPOINT: &str = "brokers-web";

/// One page worth of discovered targets.
#[derive(Debug)]
pub struct TargetPage {
    pub targets: Vec<Target>,
    /// `(endpoint, next page)` to record once the targets above have been
    /// handed off.
    pub cursor: (String, u32),
}

/// A lazy, finite, restartable sequence of fetch targets.
#[async_trait]
pub trait TargetSource: Send {
    /// Pull the next page of targets; `None` means every discovery endpoint
    /// is exhausted.
    async fn next_page(&mut self) -> Result<Option<TargetPage>>;
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Paginates the broker listing and expands each discovered agent into its
/// sub-agents, so one listing page can yield many targets.
pub struct AgentSource {
    fetcher: Arc<Fetcher>,
    config: AgentSourceConfig,
    api_base: String,
    page: u32,
    seen: HashSet<String>,
}

impl AgentSource {
    pub fn new(
        fetcher: Arc<Fetcher>,
        config: AgentSourceConfig,
        api_base: impl Into<String>,
        state: &HarvestState,
    ) -> Self {
        Self {
            fetcher,
            config,
            api_base: api_base.into(),
            page: state.cursor(BROKERS_ENDPOINT),
            seen: HashSet::new(),
        }
    }

    /// Collect sub-agent IDs for one agent, paging up to the configured cap.
    ///
    /// Sub-agent listing failures only cost the expansion, never the run.
    async fn sub_agent_ids(&self, agent_id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        for page in 1..=self.config.sub_agent_pages {
            let url = format!(
                "{}/users/company/brokers-web/{agent_id}/agents?page={page}&q=",
                self.api_base
            );
            let body = match self.fetcher.fetch_json(&url).await {
                Ok(body) => body,
                Err(error) => {
                    log::warn!("sub-agent listing for agent {agent_id} page {page}: {error}");
                    break;
                }
            };
            let page_ids = listed_ids(&body, "id");
            if page_ids.is_empty() {
                break;
            }
            ids.extend(page_ids);
        }
        ids
    }
}

#[async_trait]
impl TargetSource for AgentSource {
    async fn next_page(&mut self) -> Result<Option<TargetPage>> {
        while self.page <= self.config.max_pages {
            let page = self.page;
            let url = format!(
                "{}/users/company/brokers-web?page={page}&q=",
                self.api_base
            );
            let body = match self.fetcher.fetch_json(&url).await {
                Ok(body) => body,
                Err(error) => {
                    // A listing endpoint that keeps failing is treated as
                    // exhausted; the run ends with a shortfall, not Failed.
                    log::error!("agent listing page {page} failed: {error}");
                    return Ok(None);
                }
            };

            let ids = listed_ids(&body, "id");
            if ids.is_empty() {
                log::info!("agent listing exhausted at page {page}");
                return Ok(None);
            }

            let origin = TargetOrigin {
                endpoint: BROKERS_ENDPOINT.to_string(),
                page,
            };
            let mut targets = Vec::new();
            for id in ids {
                if !self.seen.insert(id.clone()) {
                    continue;
                }
                targets.push(Target::new(&id, Category::Agent, origin.clone()));

                for sub_id in self.sub_agent_ids(&id).await {
                    if self.seen.insert(sub_id.clone()) {
                        let sub_origin = TargetOrigin {
                            endpoint: format!("{BROKERS_ENDPOINT}/{id}/agents"),
                            page,
                        };
                        targets.push(Target::new(sub_id, Category::Agent, sub_origin));
                    }
                }
            }

            self.page += 1;
            if targets.is_empty() {
                // Every agent on this page was already yielded this run.
                continue;
            }
            return Ok(Some(TargetPage {
                targets,
                cursor: (BROKERS_ENDPOINT.to_string(), self.page),
            }));
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

/// Pulls property identifiers from several statements endpoints in order,
/// yielding each property URL once across the combined endpoints.
pub struct OwnerSource {
    fetcher: Arc<Fetcher>,
    config: OwnerSourceConfig,
    api_base: String,
    site_base: String,
    endpoint_index: usize,
    page: u32,
    start_cursors: Vec<u32>,
    seen: HashSet<String>,
}

impl OwnerSource {
    pub fn new(
        fetcher: Arc<Fetcher>,
        config: OwnerSourceConfig,
        api_base: impl Into<String>,
        site_base: impl Into<String>,
        state: &HarvestState,
    ) -> Self {
        let start_cursors: Vec<u32> = config
            .endpoints
            .iter()
            .map(|endpoint| state.cursor(endpoint))
            .collect();
        let page = start_cursors.first().copied().unwrap_or(1);
        Self {
            fetcher,
            config,
            api_base: api_base.into(),
            site_base: site_base.into(),
            endpoint_index: 0,
            page,
            start_cursors,
            seen: HashSet::new(),
        }
    }

    fn advance_endpoint(&mut self) {
        self.endpoint_index += 1;
        self.page = self
            .start_cursors
            .get(self.endpoint_index)
            .copied()
            .unwrap_or(1);
    }
}

#[async_trait]
impl TargetSource for OwnerSource {
    async fn next_page(&mut self) -> Result<Option<TargetPage>> {
        while self.endpoint_index < self.config.endpoints.len() {
            if self.page > self.config.max_pages {
                self.advance_endpoint();
                continue;
            }
            let endpoint = self.config.endpoints[self.endpoint_index].clone();
            let page = self.page;
            let url = listing_url(&self.api_base, &endpoint, page);
            let body = match self.fetcher.fetch_json(&url).await {
                Ok(body) => body,
                Err(error) => {
                    log::error!("owner listing {endpoint} page {page} failed: {error}");
                    self.advance_endpoint();
                    continue;
                }
            };

            let items = match item_array(&body) {
                Some(items) if !items.is_empty() => items,
                _ => {
                    log::info!("owner listing {endpoint} exhausted at page {page}");
                    self.advance_endpoint();
                    continue;
                }
            };

            let origin = TargetOrigin {
                endpoint: endpoint.clone(),
                page,
            };
            let mut targets = Vec::new();
            for item in items {
                let Some(id) = id_string(item, "statement_id").or_else(|| id_string(item, "id"))
                else {
                    continue;
                };
                if !self.seen.insert(id.clone()) {
                    continue;
                }
                let property_url = format!("{}/pr/{id}/", self.site_base);
                let mut target = Target::new(property_url, Category::Owner, origin.clone());
                if let Some(uuid) = id_string(item, "uuid") {
                    target = target.with_uuid(uuid);
                }
                targets.push(target);
            }

            self.page += 1;
            if targets.is_empty() {
                // Everything on this page was seen via an earlier endpoint.
                continue;
            }
            return Ok(Some(TargetPage {
                targets,
                cursor: (endpoint, self.page),
            }));
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Response-shape helpers
// ---------------------------------------------------------------------------

/// Build a listing URL, respecting query strings already present in the
/// endpoint.
fn listing_url(api_base: &str, endpoint: &str, page: u32) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{api_base}{endpoint}{separator}page={page}&limit=50")
}

/// The item array inside the API's `{"result": true, "data": {"data": [...]}}`
/// envelope, tolerating the flatter `{"data": [...]}` shape.
fn item_array(body: &Value) -> Option<&Vec<Value>> {
    let data = body.get("data")?;
    if let Some(inner) = data.get("data").and_then(Value::as_array) {
        return Some(inner);
    }
    data.as_array()
}

/// A string or numeric ID field rendered as a string.
fn id_string(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// IDs of every item in a listing response.
fn listed_ids(body: &Value, key: &str) -> Vec<String> {
    item_array(body)
        .map(|items| items.iter().filter_map(|item| id_string(item, key)).collect())
        .unwrap_or_default()
}
