//! Data API client for wallet trade and activity history.
//!
//! Every HTTP request is submitted to the shared [`RateLimiter`]. Transient
//! failures (429, 5xx, transport errors) are retried with exponential
//! backoff; each retry is a fresh limiter task, and the backoff sleep happens
//! outside the limiter slot so other callers keep moving.
//! See: https://docs.polymarket.com/developers/misc-endpoints/data-api-get-trades

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{HistoryKind, TradeFilter};
use crate::rate_limiter::{LimiterError, RateLimiter};
use crate::Config;

#[derive(Debug, Error)]
pub enum DataApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Pagination did not finish within {pages} pages")]
    PaginationLimit { pages: u32 },

    #[error(transparent)]
    Limiter(#[from] LimiterError),
}

impl DataApiError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataApiError::RequestError(e) => !e.is_builder(),
            DataApiError::ApiError { status, .. } => *status >= 500,
            DataApiError::RateLimited => true,
            DataApiError::ParseError(_)
            | DataApiError::PaginationLimit { .. }
            | DataApiError::Limiter(_) => false,
        }
    }
}

/// Raw trade or activity row as returned by the data API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataApiRecord {
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    /// Activity type ("TRADE", "REDEEM", "SPLIT", ...). Absent on /trades.
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    /// Share quantity (API sends a float, occasionally a string)
    #[serde(default, deserialize_with = "number_or_string")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub price: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    /// Explicit continuation flag, when the provider sends one
    pub has_more: Option<bool>,
}

/// The API answers with a bare array; some deployments wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageResponse {
    Records(Vec<DataApiRecord>),
    Wrapped {
        data: Vec<DataApiRecord>,
        #[serde(rename = "hasMore", default)]
        has_more: Option<bool>,
    },
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Parse a page body in either response shape.
pub fn parse_page(body: &str) -> Result<Page<DataApiRecord>, DataApiError> {
    let response: PageResponse =
        serde_json::from_str(body).map_err(|e| DataApiError::ParseError(e.to_string()))?;

    Ok(match response {
        PageResponse::Records(records) => Page {
            records,
            has_more: None,
        },
        PageResponse::Wrapped { data, has_more } => Page {
            records: data,
            has_more,
        },
    })
}

/// Build query parameters for one page request.
pub fn page_query(
    kind: HistoryKind,
    filter: &TradeFilter,
    limit: u32,
    offset: u32,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("user", filter.user.clone()),
        ("limit", limit.to_string()),
        ("offset", offset.to_string()),
    ];
    if kind == HistoryKind::Trades {
        // Default is taker-only, which hides maker fills
        params.push(("takerOnly", "false".to_string()));
    }
    if let Some(start) = filter.start_time {
        params.push(("start", start.to_string()));
    }
    if let Some(end) = filter.end_time {
        params.push(("end", end.to_string()));
    }
    if let Some(condition_id) = &filter.condition_id {
        params.push(("market", condition_id.clone()));
    }
    if let Some(slug) = &filter.market_slug {
        params.push(("slug", slug.clone()));
    }
    params
}

/// Run `op`, retrying transient failures with doubling backoff.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, DataApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DataApiError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = initial_backoff.saturating_mul(2u32.saturating_pow(attempt));
                attempt += 1;
                warn!(
                    "Data API request failed ({}), retry {}/{} in {:?}",
                    e, attempt, max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Data API client. Cheap to share behind `Arc`.
pub struct DataApiClient {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl DataApiClient {
    /// Create a client that routes every request through `limiter`.
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self, DataApiError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.data_api_url.clone(),
            limiter,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch one page, retrying transient failures.
    pub async fn fetch_page(
        &self,
        kind: HistoryKind,
        filter: &TradeFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Page<DataApiRecord>, DataApiError> {
        retry_with_backoff(self.max_retries, self.retry_backoff, move || {
            self.limiter
                .execute(move || self.request_page(kind, filter, limit, offset))
        })
        .await
    }

    /// Single HTTP round trip, no retries.
    async fn request_page(
        &self,
        kind: HistoryKind,
        filter: &TradeFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Page<DataApiRecord>, DataApiError> {
        let url = format!("{}/{}", self.base_url, kind.path());
        let params = page_query(kind, filter, limit, offset);

        debug!(
            "Fetching {} for {} (offset={}, limit={})",
            kind.path(),
            filter.user,
            offset,
            limit
        );

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DataApiError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let page = parse_page(&body)?;
        debug!("Fetched {} records at offset {}", page.records.len(), offset);
        Ok(page)
    }
}
