//! FIFO position reconstruction for a single market.
//!
//! Trades are replayed oldest first. Buys open lots at the tail of a queue;
//! sells consume lots from the head, realizing `(sell - lot) * shares` for
//! every matched share. Shares sold beyond the recorded buys (a position
//! opened before the observed window) are left unmatched and realize nothing.

use std::collections::{HashSet, VecDeque};

use common::{TradeRecord, TradeSide};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;

use crate::error::AnalyticsError;

/// An open buy fragment waiting for future sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lot {
    pub shares: Decimal,
    pub price: Decimal,
}

/// Result of matching one sell against the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellMatch {
    pub realized: Decimal,
    /// Sold shares with no lot left to match
    pub unmatched: Decimal,
}

/// Open lots, oldest first.
#[derive(Debug, Clone, Default)]
pub struct LotQueue {
    lots: VecDeque<Lot>,
}

impl LotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, shares: Decimal, price: Decimal) {
        self.lots.push_back(Lot { shares, price });
    }

    /// Consume `shares` from the head of the queue at `sell_price`.
    pub fn consume(&mut self, shares: Decimal, sell_price: Decimal) -> SellMatch {
        let mut remaining = shares;
        let mut realized = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };

            if lot.shares <= remaining {
                realized += (sell_price - lot.price) * lot.shares;
                remaining -= lot.shares;
                self.lots.pop_front();
            } else {
                realized += (sell_price - lot.price) * remaining;
                lot.shares -= remaining;
                remaining = Decimal::ZERO;
            }
        }

        SellMatch {
            realized,
            unmatched: remaining,
        }
    }

    pub fn open_shares(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.shares).sum()
    }

    /// Share-weighted cost of the open lots, `None` when nothing is open.
    pub fn avg_cost(&self) -> Option<Decimal> {
        let shares = self.open_shares();
        if shares.is_zero() {
            return None;
        }
        let cost: Decimal = self.lots.iter().map(|lot| lot.price * lot.shares).sum();
        Some(cost / shares)
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Derived per-market position, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub condition_id: String,
    pub market_slug: String,
    pub title: String,
    pub total_bought: Decimal,
    pub total_sold: Decimal,
    /// Always `total_bought - total_sold`; negative when oversold
    pub current_holding: Decimal,
    #[serde(rename = "realizedPnL")]
    pub realized_pnl: Decimal,
    #[serde(rename = "unrealizedPnL")]
    pub unrealized_pnl: Decimal,
    #[serde(rename = "totalPnL")]
    pub total_pnl: Decimal,
    pub trade_count: usize,
    pub avg_buy_price: Decimal,
    pub avg_sell_price: Decimal,
    /// Cost of the lots still open
    pub avg_cost_price: Decimal,
    /// Mark used for unrealized P&L
    pub last_trade_price: Decimal,
    pub first_trade_time: i64,
    pub last_trade_time: i64,
    pub wallet_count: usize,
}

impl MarketSummary {
    pub fn volume(&self) -> Decimal {
        self.total_bought + self.total_sold
    }
}

fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Rebuild one market's position from all of its trades.
///
/// `trades` may come from several wallets and in any order; they are sorted
/// by timestamp (stable, so ties keep arrival order) before replay.
pub fn reconstruct_position(trades: &[TradeRecord]) -> Result<MarketSummary, AnalyticsError> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|trade| trade.timestamp);

    let (Some(first), Some(last)) = (ordered.first().copied(), ordered.last().copied()) else {
        error!("FIFO reconstruction called with no trades");
        return Err(AnalyticsError::EmptyInput {
            market: String::from("<unknown>"),
        });
    };

    let mut lots = LotQueue::new();
    let mut realized_pnl = Decimal::ZERO;
    let mut total_bought = Decimal::ZERO;
    let mut total_sold = Decimal::ZERO;
    let mut total_buy_value = Decimal::ZERO;
    let mut total_sell_value = Decimal::ZERO;
    let mut wallets = HashSet::new();

    for trade in &ordered {
        wallets.insert(trade.wallet.as_str());
        match trade.side {
            TradeSide::Buy => {
                total_bought += trade.shares;
                total_buy_value += trade.value();
                lots.push(trade.shares, trade.price);
            }
            TradeSide::Sell => {
                total_sold += trade.shares;
                total_sell_value += trade.value();
                let matched = lots.consume(trade.shares, trade.price);
                realized_pnl += matched.realized;
            }
        }
    }

    let current_holding = total_bought - total_sold;
    let avg_buy_price = safe_div(total_buy_value, total_bought);
    let avg_sell_price = safe_div(total_sell_value, total_sold);
    let avg_cost_price = lots.avg_cost().unwrap_or(avg_buy_price);
    let last_trade_price = last.price;

    let unrealized_pnl = if current_holding > Decimal::ZERO {
        (last_trade_price - avg_cost_price) * current_holding
    } else {
        Decimal::ZERO
    };

    Ok(MarketSummary {
        condition_id: first.condition_id.clone(),
        market_slug: first.market_slug.clone(),
        title: first.title.clone(),
        total_bought,
        total_sold,
        current_holding,
        realized_pnl,
        unrealized_pnl,
        total_pnl: realized_pnl + unrealized_pnl,
        trade_count: ordered.len(),
        avg_buy_price,
        avg_sell_price,
        avg_cost_price,
        last_trade_price,
        first_trade_time: first.timestamp,
        last_trade_time: last.timestamp,
        wallet_count: wallets.len(),
    })
}
