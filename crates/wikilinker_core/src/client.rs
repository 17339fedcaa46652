use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::config::LinkerConfig;

/// Read-only access to a MediaWiki `api.php` endpoint.
///
/// Implementations add `format=json&formatversion=2` to every request and turn
/// API-level `error` payloads into errors.
#[async_trait]
pub trait WikiApi: Send + Sync {
    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiHttpConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiHttpConfig {
    pub fn from_config(config: &LinkerConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            max_retries: config.retries(),
            retry_delay_ms: config.retry_delay_ms(),
        }
    }
}

pub struct MediaWikiHttp {
    client: Client,
    config: MediaWikiHttpConfig,
}

impl MediaWikiHttp {
    pub fn new(config: MediaWikiHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build MediaWiki HTTP client")?;
        Ok(Self { client, config })
    }

    async fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(base.saturating_add(jitter))).await;
    }
}

#[async_trait]
impl WikiApi for MediaWikiHttp {
    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let base_url =
            Url::parse(endpoint).with_context(|| format!("invalid API endpoint: {endpoint}"))?;
        let pairs = query_pairs(params);

        for attempt in 0..=self.config.max_retries {
            let response = self.client.get(base_url.clone()).query(&pairs).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt).await;
                            continue;
                        }
                        bail!("MediaWiki API request to {endpoint} failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .await
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("failed to call MediaWiki API at {endpoint}"));
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }
}

fn query_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(())
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
