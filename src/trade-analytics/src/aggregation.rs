//! Cross-wallet market grouping and portfolio roll-ups.

use std::collections::BTreeMap;

use common::TradeRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::fifo::{reconstruct_position, MarketSummary};

/// Identity of one market. Trades sharing a key form one logical position,
/// whichever wallet made them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub condition_id: String,
    pub market_slug: String,
}

impl MarketKey {
    pub fn of(trade: &TradeRecord) -> Self {
        Self {
            condition_id: trade.condition_id.clone(),
            market_slug: trade.market_slug.clone(),
        }
    }
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.market_slug, self.condition_id)
    }
}

/// Pool trades by market. Every group is non-empty and keeps arrival order.
pub fn group_by_market(trades: &[TradeRecord]) -> BTreeMap<MarketKey, Vec<TradeRecord>> {
    let mut groups: BTreeMap<MarketKey, Vec<TradeRecord>> = BTreeMap::new();
    for trade in trades {
        groups
            .entry(MarketKey::of(trade))
            .or_default()
            .push(trade.clone());
    }
    groups
}

/// One FIFO run per market over the pooled trades, best `total_pnl` first.
pub fn market_summaries(trades: &[TradeRecord]) -> Result<Vec<MarketSummary>, AnalyticsError> {
    let mut summaries = group_by_market(trades)
        .into_iter()
        .map(|(key, group)| {
            reconstruct_position(&group).map_err(|e| match e {
                AnalyticsError::EmptyInput { .. } => AnalyticsError::EmptyInput {
                    market: key.to_string(),
                },
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    summaries.sort_by(|a, b| {
        b.total_pnl
            .cmp(&a.total_pnl)
            .then_with(|| a.condition_id.cmp(&b.condition_id))
    });
    Ok(summaries)
}

/// Portfolio-level statistics over all market summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    #[serde(rename = "totalRealizedPnL")]
    pub total_realized_pnl: Decimal,
    #[serde(rename = "totalUnrealizedPnL")]
    pub total_unrealized_pnl: Decimal,
    #[serde(rename = "totalPnL")]
    pub total_pnl: Decimal,
    pub total_trades: usize,
    /// Shares bought plus shares sold, all markets
    pub total_volume: Decimal,
    pub market_count: usize,
    pub winning_markets: usize,
    pub losing_markets: usize,
    /// Percent of markets with positive total P&L
    pub win_rate: f64,
    pub loss_rate: f64,
    /// Mean total P&L of winning markets
    pub avg_profit: Decimal,
    /// Mean loss magnitude of losing markets
    pub avg_loss: Decimal,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn mean(sum: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

/// Roll market summaries up into portfolio statistics.
pub fn overall_stats(summaries: &[MarketSummary]) -> OverallStats {
    let total_realized_pnl: Decimal = summaries.iter().map(|s| s.realized_pnl).sum();
    let total_unrealized_pnl: Decimal = summaries.iter().map(|s| s.unrealized_pnl).sum();

    let winners: Vec<&MarketSummary> = summaries
        .iter()
        .filter(|s| s.total_pnl > Decimal::ZERO)
        .collect();
    let losers: Vec<&MarketSummary> = summaries
        .iter()
        .filter(|s| s.total_pnl < Decimal::ZERO)
        .collect();

    let total_profit: Decimal = winners.iter().map(|s| s.total_pnl).sum();
    let total_loss: Decimal = losers.iter().map(|s| s.total_pnl.abs()).sum();

    OverallStats {
        total_realized_pnl,
        total_unrealized_pnl,
        total_pnl: total_realized_pnl + total_unrealized_pnl,
        total_trades: summaries.iter().map(|s| s.trade_count).sum(),
        total_volume: summaries.iter().map(MarketSummary::volume).sum(),
        market_count: summaries.len(),
        winning_markets: winners.len(),
        losing_markets: losers.len(),
        win_rate: percent(winners.len(), summaries.len()),
        loss_rate: percent(losers.len(), summaries.len()),
        avg_profit: mean(total_profit, winners.len()),
        avg_loss: mean(total_loss, losers.len()),
    }
}

impl OverallStats {
    /// Profit factor (gross profit / gross loss); `None` without losses.
    pub fn profit_factor(&self) -> Option<f64> {
        let gross_loss = self.avg_loss * Decimal::from(self.losing_markets);
        if gross_loss.is_zero() {
            return None;
        }
        let gross_profit = self.avg_profit * Decimal::from(self.winning_markets);
        (gross_profit / gross_loss).to_f64()
    }
}
