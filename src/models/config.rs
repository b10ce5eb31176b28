//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry/backoff policy for transient fetch failures
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Agent discovery settings
    #[serde(default)]
    pub agents: AgentSourceConfig,

    /// Owner discovery settings
    #[serde(default)]
    pub owners: OwnerSourceConfig,

    /// Alternate render transport settings
    #[serde(default)]
    pub render: RenderConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        Url::parse(&self.http.api_base)
            .map_err(|e| AppError::validation(format!("http.api_base is not a URL: {e}")))?;
        Url::parse(&self.http.site_base)
            .map_err(|e| AppError::validation(format!("http.site_base is not a URL: {e}")))?;
        if self.backoff.max_attempts == 0 {
            return Err(AppError::validation("backoff.max_attempts must be > 0"));
        }
        if self.agents.target_count == 0 {
            return Err(AppError::validation("agents.target_count must be > 0"));
        }
        if self.owners.target_count == 0 {
            return Err(AppError::validation("owners.target_count must be > 0"));
        }
        if self.owners.endpoints.is_empty() {
            return Err(AppError::validation("No owner discovery endpoints defined"));
        }
        Ok(())
    }
}

/// HTTP client and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between consecutive fetches in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent fetches within one batch
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Base URL of the listing API
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Base URL of the public site (property pages, Referer header)
    #[serde(default = "defaults::site_base")]
    pub site_base: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            api_base: defaults::api_base(),
            site_base: defaults::site_base(),
        }
    }
}

/// Retry schedule for transient fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Attempts before a transient failure becomes permanent
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds; doubles per attempt
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Separate retry cap for HTTP 429 responses
    #[serde(default = "defaults::rate_limit_retries")]
    pub rate_limit_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
            rate_limit_retries: defaults::rate_limit_retries(),
        }
    }
}

/// Agent discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSourceConfig {
    /// Unique agent phones to collect
    #[serde(default = "defaults::target_count")]
    pub target_count: usize,

    /// Upper bound on broker listing pages
    #[serde(default = "defaults::agent_max_pages")]
    pub max_pages: u32,

    /// Sub-agent pages fetched per discovered agent
    #[serde(default = "defaults::sub_agent_pages")]
    pub sub_agent_pages: u32,
}

impl Default for AgentSourceConfig {
    fn default() -> Self {
        Self {
            target_count: defaults::target_count(),
            max_pages: defaults::agent_max_pages(),
            sub_agent_pages: defaults::sub_agent_pages(),
        }
    }
}

/// Owner discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSourceConfig {
    /// Unique owner phones to collect
    #[serde(default = "defaults::target_count")]
    pub target_count: usize,

    /// Upper bound on listing pages per endpoint
    #[serde(default = "defaults::owner_max_pages")]
    pub max_pages: u32,

    /// Statement endpoints queried in order; several endpoints counter the
    /// case where one is exhausted before the target is met
    #[serde(default = "defaults::owner_endpoints")]
    pub endpoints: Vec<String>,
}

impl Default for OwnerSourceConfig {
    fn default() -> Self {
        Self {
            target_count: defaults::target_count(),
            max_pages: defaults::owner_max_pages(),
            endpoints: defaults::owner_endpoints(),
        }
    }
}

/// Alternate render transport (headless-browser-style service).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenderConfig {
    /// Rendering service endpoint; when unset, unusable primary content
    /// fails the target
    #[serde(default)]
    pub endpoint: Option<String>,
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn api_base() -> String {
        "https://api-statements.tnet.ge/v1".into()
    }
    pub fn site_base() -> String {
        "https://www.myhome.ge".into()
    }

    // Backoff defaults
    pub fn max_attempts() -> u32 {
        4
    }
    pub fn base_delay() -> u64 {
        500
    }
    pub fn max_delay() -> u64 {
        30_000
    }
    pub fn rate_limit_retries() -> u32 {
        6
    }

    // Discovery defaults
    pub fn target_count() -> usize {
        8_000
    }
    pub fn agent_max_pages() -> u32 {
        109
    }
    pub fn sub_agent_pages() -> u32 {
        5
    }
    pub fn owner_max_pages() -> u32 {
        1_000
    }
    pub fn owner_endpoints() -> Vec<String> {
        vec![
            "/statements".into(),
            "/statements?operation_type_id=1".into(),
            "/statements?operation_type_id=2".into(),
            "/statements?operation_type_id=3".into(),
            "/statements?operation_type_id=4".into(),
        ]
    }
}
