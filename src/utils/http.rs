// src/utils/http.rs

//! HTTP client construction.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Create the shared asynchronous HTTP client.
///
/// The listing API rejects requests missing the website key and locale
/// headers, so they are applied to every request here.
pub fn create_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(REFERER, header_value(&format!("{}/", config.site_base))?);
    headers.insert(ORIGIN, header_value(&config.site_base)?);
    headers.insert("x-website-key", HeaderValue::from_static("myhome"));
    headers.insert("locale", HeaderValue::from_static("ka"));

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::config(format!("invalid header value '{value}': {e}")))
}
