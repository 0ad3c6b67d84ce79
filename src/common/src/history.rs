//! Complete trade history for one wallet.
//!
//! Pages through the data API until a short page (or `hasMore: false`) marks
//! the end of the data. A page that still fails after retries fails the whole
//! fetch: callers never receive a silently truncated history.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::data_api::{DataApiClient, DataApiError, DataApiRecord, Page};
use crate::models::{HistoryKind, TradeFilter, TradeRecord, TradeSide};
use crate::rate_limiter::RateLimiter;
use crate::Config;

/// Request pages at increasing offsets until the provider runs out.
///
/// Stops on a page shorter than `page_size` or an explicit `has_more == false`.
/// Exceeding `max_pages` is an error rather than a partial result.
pub async fn collect_pages<T, F, Fut>(
    page_size: u32,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Vec<T>, DataApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, DataApiError>>,
{
    let mut all_records = Vec::new();

    for page_index in 0..max_pages {
        let offset = page_index * page_size;
        let page = fetch_page(offset).await?;

        let count = page.records.len();
        all_records.extend(page.records);

        if count < page_size as usize || page.has_more == Some(false) {
            return Ok(all_records);
        }
    }

    Err(DataApiError::PaginationLimit { pages: max_pages })
}

/// Convert a raw row into a `TradeRecord`, dropping rows that are not trades
/// or that violate the share/price invariants.
pub fn to_trade_record(raw: DataApiRecord, wallet: &str) -> Option<TradeRecord> {
    if let Some(kind) = raw.activity_type.as_deref() {
        if !kind.eq_ignore_ascii_case("TRADE") {
            debug!("Skipping {} activity in {}", kind, raw.slug);
            return None;
        }
    }

    let side = match raw.side.as_deref().and_then(TradeSide::parse) {
        Some(side) => side,
        None => {
            warn!("Skipping trade with unknown side {:?} in {}", raw.side, raw.slug);
            return None;
        }
    };

    let Some(timestamp) = raw.timestamp else {
        warn!("Skipping trade without timestamp in {}", raw.slug);
        return None;
    };

    let shares = raw.size.and_then(|s| Decimal::try_from(s).ok());
    let price = raw.price.and_then(|p| Decimal::try_from(p).ok());
    let (shares, price) = match (shares, price) {
        (Some(shares), Some(price))
            if shares > Decimal::ZERO && price >= Decimal::ZERO && price <= Decimal::ONE =>
        {
            (shares, price)
        }
        _ => {
            warn!(
                "Skipping trade with invalid size/price ({:?} @ {:?}) in {}",
                raw.size, raw.price, raw.slug
            );
            return None;
        }
    };

    Some(TradeRecord {
        wallet: wallet.to_lowercase(),
        condition_id: raw.condition_id,
        market_slug: raw.slug,
        title: raw.title,
        timestamp,
        side,
        shares,
        price,
        outcome: raw.outcome,
        transaction_hash: raw.transaction_hash,
    })
}

/// Fetches complete wallet histories through the shared rate limiter.
pub struct HistoryFetcher {
    client: DataApiClient,
    page_size: u32,
    max_pages: u32,
}

impl HistoryFetcher {
    /// Create a fetcher whose every request goes through `limiter`.
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self, DataApiError> {
        Ok(Self {
            client: DataApiClient::new(config, limiter)?,
            page_size: config.page_size,
            max_pages: config.max_pages,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.client.limiter()
    }

    /// All matched trades for `filter.user`, in no particular order.
    pub async fn get_all_trade_history(
        &self,
        filter: &TradeFilter,
    ) -> Result<Vec<TradeRecord>, DataApiError> {
        self.get_all_history(HistoryKind::Trades, filter).await
    }

    /// Trades taken from the activity feed for `filter.user`.
    pub async fn get_all_activity(
        &self,
        filter: &TradeFilter,
    ) -> Result<Vec<TradeRecord>, DataApiError> {
        self.get_all_history(HistoryKind::Activity, filter).await
    }

    pub async fn get_all_history(
        &self,
        kind: HistoryKind,
        filter: &TradeFilter,
    ) -> Result<Vec<TradeRecord>, DataApiError> {
        let client = &self.client;
        let page_size = self.page_size;

        let raw = collect_pages(page_size, self.max_pages, move |offset| {
            client.fetch_page(kind, filter, page_size, offset)
        })
        .await?;

        let raw_count = raw.len();
        let records: Vec<TradeRecord> = raw
            .into_iter()
            .filter_map(|row| to_trade_record(row, &filter.user))
            .filter(|record| filter.matches(record))
            .collect();

        info!(
            "Fetched {} {} for {} ({} raw rows)",
            records.len(),
            kind.path(),
            filter.user,
            raw_count
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn raw(side: &str, size: f64, price: f64) -> DataApiRecord {
        DataApiRecord {
            side: Some(side.to_string()),
            size: Some(size),
            price: Some(price),
            timestamp: Some(1_700_000_000),
            condition_id: "0xcond".to_string(),
            slug: "eth-flip".to_string(),
            title: "ETH flips BTC?".to_string(),
            ..Default::default()
        }
    }

    fn page(len: usize, has_more: Option<bool>) -> Page<usize> {
        Page {
            records: (0..len).collect(),
            has_more,
        }
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_short_page() {
        let offsets = Mutex::new(Vec::new());
        let offsets_ref = &offsets;

        let records = collect_pages(3, 10, move |offset| async move {
            offsets_ref.lock().unwrap().push(offset);
            Ok(match offset {
                0 | 3 => page(3, None),
                _ => page(1, None),
            })
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 7);
        assert_eq!(*offsets.lock().unwrap(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_collect_pages_honours_has_more_flag() {
        let records = collect_pages(2, 10, |_| async { Ok(page(2, Some(false))) })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_pages_exact_multiple_ends_on_empty_page() {
        let records = collect_pages(2, 10, |offset| async move {
            Ok(if offset < 4 { page(2, None) } else { page(0, None) })
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn test_collect_pages_fails_fast_on_page_error() {
        let result = collect_pages(2, 10, |offset| async move {
            if offset == 2 {
                Err(DataApiError::ApiError {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(page(2, None))
            }
        })
        .await;

        assert!(matches!(result, Err(DataApiError::ApiError { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_collect_pages_limit_is_an_error() {
        let result = collect_pages(1, 3, |_| async { Ok(page(1, None)) }).await;

        assert!(matches!(result, Err(DataApiError::PaginationLimit { pages: 3 })));
    }

    #[test]
    fn test_to_trade_record_converts_trade() {
        let record = to_trade_record(raw("BUY", 10.0, 0.4), "0xABC").unwrap();

        assert_eq!(record.wallet, "0xabc");
        assert_eq!(record.side, TradeSide::Buy);
        assert_eq!(record.shares, dec!(10));
        assert_eq!(record.price, dec!(0.4));
        assert_eq!(record.market_slug, "eth-flip");
        assert_eq!(record.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_to_trade_record_skips_non_trade_activity() {
        let mut redeem = raw("BUY", 10.0, 0.4);
        redeem.activity_type = Some("REDEEM".to_string());
        assert!(to_trade_record(redeem, "0xabc").is_none());

        let mut trade = raw("SELL", 1.0, 0.5);
        trade.activity_type = Some("TRADE".to_string());
        assert!(to_trade_record(trade, "0xabc").is_some());
    }

    #[test]
    fn test_to_trade_record_rejects_invalid_rows() {
        assert!(to_trade_record(raw("HOLD", 10.0, 0.4), "0xabc").is_none());
        assert!(to_trade_record(raw("BUY", 0.0, 0.4), "0xabc").is_none());
        assert!(to_trade_record(raw("BUY", 5.0, 1.2), "0xabc").is_none());
        assert!(to_trade_record(raw("BUY", 5.0, -0.1), "0xabc").is_none());

        let mut no_time = raw("BUY", 5.0, 0.5);
        no_time.timestamp = None;
        assert!(to_trade_record(no_time, "0xabc").is_none());
    }

    #[test]
    fn test_to_trade_record_accepts_price_bounds() {
        assert!(to_trade_record(raw("SELL", 5.0, 0.0), "0xabc").is_some());
        assert!(to_trade_record(raw("SELL", 5.0, 1.0), "0xabc").is_some());
    }
}
