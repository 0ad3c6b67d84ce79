//! Trading analytics over complete wallet histories.
//!
//! - `fifo`: per-market FIFO position reconstruction and P&L
//! - `aggregation`: cross-wallet grouping and portfolio statistics
//! - `behavior`: trade frequency and holding-time metrics
//! - `service`: request validation and the combined report

pub mod aggregation;
pub mod behavior;
pub mod error;
pub mod fifo;
pub mod service;

pub use aggregation::{group_by_market, market_summaries, overall_stats, MarketKey, OverallStats};
pub use behavior::{trading_behavior, TradingBehavior};
pub use error::AnalyticsError;
pub use fifo::{reconstruct_position, Lot, LotQueue, MarketSummary};
pub use service::{
    AnalyticsReport, AnalyticsRequest, AnalyticsService, DataApiHistorySource, TradeHistorySource,
    WalletFailure,
};
