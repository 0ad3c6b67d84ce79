//! Analytics requests: validate, fetch every wallet once, compute all views.
//!
//! Wallets are fetched one after another rather than concurrently, which keeps
//! at most one wallet's pages waiting in the rate limiter queue. A wallet whose
//! fetch fails is logged and left out of the pool; the report lists it under
//! `failedWallets` so the caller can tell the result is partial.

use async_trait::async_trait;
use common::{DataApiError, HistoryFetcher, HistoryKind, TradeFilter, TradeRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregation::{market_summaries, overall_stats, OverallStats};
use crate::behavior::{trading_behavior, TradingBehavior};
use crate::error::AnalyticsError;
use crate::fifo::MarketSummary;

/// Source of complete wallet histories.
/// Mockable for testing via mockall.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeHistorySource: Send + Sync {
    /// Every trade matching `filter`, in no particular order.
    async fn fetch_history(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>, DataApiError>;
}

/// Data API backed history source.
pub struct DataApiHistorySource {
    fetcher: HistoryFetcher,
    kind: HistoryKind,
}

impl DataApiHistorySource {
    pub fn new(fetcher: HistoryFetcher, kind: HistoryKind) -> Self {
        Self { fetcher, kind }
    }
}

#[async_trait]
impl TradeHistorySource for DataApiHistorySource {
    async fn fetch_history(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>, DataApiError> {
        match self.kind {
            HistoryKind::Trades => self.fetcher.get_all_trade_history(filter).await,
            HistoryKind::Activity => self.fetcher.get_all_activity(filter).await,
        }
    }
}

/// Inbound request shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub wallet_addresses: Vec<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

/// `0x` followed by 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    let Some(hex) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

impl AnalyticsRequest {
    pub fn new(wallet_addresses: Vec<String>) -> Self {
        Self {
            wallet_addresses,
            ..Self::default()
        }
    }

    /// Lower-cased, de-duplicated wallets in request order.
    pub fn validated_wallets(&self) -> Result<Vec<String>, AnalyticsError> {
        if self.wallet_addresses.is_empty() {
            return Err(AnalyticsError::Validation(
                "at least one wallet address is required".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(AnalyticsError::Validation(format!(
                    "startTime {} is after endTime {}",
                    start, end
                )));
            }
        }

        let mut wallets: Vec<String> = Vec::with_capacity(self.wallet_addresses.len());
        for address in &self.wallet_addresses {
            let address = address.trim();
            if !is_valid_address(address) {
                return Err(AnalyticsError::Validation(format!(
                    "invalid wallet address: {}",
                    address
                )));
            }
            let address = address.to_lowercase();
            if !wallets.contains(&address) {
                wallets.push(address);
            }
        }
        Ok(wallets)
    }

    fn filter_for(&self, wallet: &str) -> TradeFilter {
        TradeFilter::for_user(wallet).with_time_range(self.start_time, self.end_time)
    }
}

/// A wallet left out of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletFailure {
    pub wallet: String,
    pub error: String,
}

/// Trades from every wallet that could be fetched.
#[derive(Debug, Clone, Default)]
pub struct PooledTrades {
    pub trades: Vec<TradeRecord>,
    pub failed_wallets: Vec<WalletFailure>,
}

/// Combined response: one fetch cycle, every derived view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub market_summaries: Vec<MarketSummary>,
    pub overall_stats: OverallStats,
    pub trading_behavior: TradingBehavior,
    pub failed_wallets: Vec<WalletFailure>,
}

pub struct AnalyticsService<S> {
    source: S,
}

impl<S: TradeHistorySource> AnalyticsService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch every wallet serially and pool the trades.
    pub async fn collect_trades(
        &self,
        request: &AnalyticsRequest,
    ) -> Result<PooledTrades, AnalyticsError> {
        let wallets = request.validated_wallets()?;
        let mut pooled = PooledTrades::default();

        for wallet in &wallets {
            let filter = request.filter_for(wallet);
            match self.source.fetch_history(&filter).await {
                Ok(trades) => {
                    info!("Wallet {}: {} trades", wallet, trades.len());
                    pooled.trades.extend(trades);
                }
                Err(e) => {
                    let error = AnalyticsError::from_fetch(wallet, e);
                    warn!("Skipping wallet {}: {}", wallet, error);
                    pooled.failed_wallets.push(WalletFailure {
                        wallet: wallet.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            "Pooled {} trades from {}/{} wallets",
            pooled.trades.len(),
            wallets.len() - pooled.failed_wallets.len(),
            wallets.len()
        );
        Ok(pooled)
    }

    pub async fn get_market_summaries(
        &self,
        request: &AnalyticsRequest,
    ) -> Result<Vec<MarketSummary>, AnalyticsError> {
        let pooled = self.collect_trades(request).await?;
        market_summaries(&pooled.trades)
    }

    pub async fn get_overall_stats(
        &self,
        request: &AnalyticsRequest,
    ) -> Result<OverallStats, AnalyticsError> {
        let summaries = self.get_market_summaries(request).await?;
        Ok(overall_stats(&summaries))
    }

    pub async fn get_trading_behavior(
        &self,
        request: &AnalyticsRequest,
    ) -> Result<TradingBehavior, AnalyticsError> {
        let pooled = self.collect_trades(request).await?;
        Ok(trading_behavior(&pooled.trades))
    }

    /// All views from a single fetch of each wallet.
    pub async fn get_report(
        &self,
        request: &AnalyticsRequest,
    ) -> Result<AnalyticsReport, AnalyticsError> {
        let pooled = self.collect_trades(request).await?;
        let summaries = market_summaries(&pooled.trades)?;

        Ok(AnalyticsReport {
            overall_stats: overall_stats(&summaries),
            trading_behavior: trading_behavior(&pooled.trades),
            market_summaries: summaries,
            failed_wallets: pooled.failed_wallets,
        })
    }
}
