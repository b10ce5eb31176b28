// src/services/fetch.rs

//! Network fetch for single targets: timeout, retry-with-backoff and an
//! alternate render transport for pages the primary transport cannot read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::FetchError;
use crate::models::{BackoffConfig, Category, Target};

/// Fetch seam the harvest loop depends on.
#[async_trait]
pub trait TargetFetcher: Send + Sync {
    /// Retrieve the raw content for one target.
    async fn fetch_target(&self, target: &Target) -> Result<String, FetchError>;
}

/// Substitutable delay so retry logic is testable without real time.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Tokio-backed delay used outside tests.
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Alternate transport invoked when the primary response lacks extractable
/// structure. Contract: given a target URL, return raw page content or fail.
#[async_trait]
pub trait RenderTransport: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, FetchError>;
}

/// Renders a page through an external rendering service.
pub struct HttpRender {
    client: Client,
    endpoint: String,
}

impl HttpRender {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RenderTransport for HttpRender {
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(FetchError::from_reqwest)
    }
}

/// Explicit exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_retries: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_retries: config.rate_limit_retries,
        }
    }

    /// Delay before the given retry attempt (1-based), doubling up to the
    /// ceiling.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Performs the network calls for single targets.
pub struct Fetcher {
    client: Client,
    api_base: String,
    policy: BackoffPolicy,
    delay: Arc<dyn Delay>,
    render: Option<Arc<dyn RenderTransport>>,
}

impl Fetcher {
    pub fn new(client: Client, api_base: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            policy,
            delay: Arc::new(TokioDelay),
            render: None,
        }
    }

    /// Replace the delay implementation (tests).
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Attach the alternate render transport.
    pub fn with_render(mut self, render: Arc<dyn RenderTransport>) -> Self {
        self.render = Some(render);
        self
    }

    /// Fetch a discovery/listing document and parse it as JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let body = self.request_with_retry(url, false).await?;
        serde_json::from_str(&body).map_err(|_| FetchError::Unusable)
    }

    /// Fetch an HTML page, falling back to the render transport when the
    /// body carries no extractable structure.
    pub async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let body = self.request_with_retry(url, false).await?;
        if usable(&body) {
            return Ok(body);
        }
        if let Some(render) = &self.render {
            log::debug!("primary content unusable for {url}, trying render transport");
            let rendered = render.render(url).await?;
            if usable(&rendered) {
                return Ok(rendered);
            }
        }
        Err(FetchError::Unusable)
    }

    async fn request_with_retry(&self, url: &str, post: bool) -> Result<String, FetchError> {
        let mut attempts = 0u32;
        let mut rate_limit_hits = 0u32;
        loop {
            let error = match self.send_once(url, post).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };
            match &error {
                FetchError::RateLimited => {
                    rate_limit_hits += 1;
                    if rate_limit_hits > self.policy.rate_limit_retries {
                        return Err(FetchError::RateLimited);
                    }
                    let pause = self.policy.delay_for(rate_limit_hits);
                    log::warn!(
                        "rate limited on {url}, backing off {}ms ({rate_limit_hits}/{})",
                        pause.as_millis(),
                        self.policy.rate_limit_retries
                    );
                    self.delay.wait(pause).await;
                }
                e if e.is_transient() => {
                    attempts += 1;
                    if attempts >= self.policy.max_attempts {
                        return Err(error);
                    }
                    let pause = self.policy.delay_for(attempts);
                    log::debug!(
                        "transient failure on {url} ({error}), retry {attempts}/{} in {}ms",
                        self.policy.max_attempts,
                        pause.as_millis()
                    );
                    self.delay.wait(pause).await;
                }
                _ => return Err(error),
            }
        }
    }

    async fn send_once(&self, url: &str, post: bool) -> Result<String, FetchError> {
        let request = if post {
            // The phone-show endpoint expects a POST with an empty JSON body.
            self.client.post(url).json(&serde_json::json!({}))
        } else {
            self.client.get(url)
        };
        let response = request.send().await.map_err(FetchError::from_reqwest)?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(FetchError::from_reqwest)
    }
}

#[async_trait]
impl TargetFetcher for Fetcher {
    async fn fetch_target(&self, target: &Target) -> Result<String, FetchError> {
        match target.category {
            Category::Agent => {
                let url = format!("{}/users/company/brokers/{}", self.api_base, target.id);
                self.request_with_retry(&url, false).await
            }
            Category::Owner => {
                if let Some(uuid) = &target.uuid {
                    let url = format!(
                        "{}/statements/phone/show?statement_uuid={uuid}",
                        self.api_base
                    );
                    self.request_with_retry(&url, true).await
                } else {
                    self.fetch_page(&target.id).await
                }
            }
        }
    }
}

/// Whether a body looks like content the extractor can work with.
fn usable(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return false;
    }
    let head: String = trimmed
        .chars()
        .take(2048)
        .collect::<String>()
        .to_lowercase();
    !(head.contains("captcha") || head.contains("access denied") || head.contains("challenge-form"))
}
