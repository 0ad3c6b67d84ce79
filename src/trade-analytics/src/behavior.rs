//! Behavioral statistics over the raw pooled trade list.
//!
//! Holding time pairs each sell with the earliest unconsumed buy of the same
//! market that happened strictly before it, one buy per sell regardless of
//! size. This is a coarse behavioral estimate and does not follow the FIFO
//! lot assignment used for P&L.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Timelike, Utc};
use common::{TradeRecord, TradeSide};
use serde::Serialize;

use crate::aggregation::MarketKey;

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_WEEK: f64 = 7.0 * SECONDS_PER_DAY;
const SECONDS_PER_HOUR: f64 = 3_600.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingBehavior {
    pub total_trades: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    /// buys / sells, or the buy count when there are no sells
    pub buy_sell_ratio: f64,
    pub trades_per_day: f64,
    pub trades_per_week: f64,
    pub avg_holding_time_hours: f64,
    /// Sells paired with an earlier buy
    pub matched_round_trips: usize,
    pub most_active_hour_utc: Option<u32>,
    pub first_trade_time: Option<i64>,
    pub last_trade_time: Option<i64>,
}

/// Trades per unit of time across the observed span; 0 for a zero span.
fn frequency(count: usize, span_secs: i64, unit_secs: f64) -> f64 {
    if span_secs <= 0 {
        return 0.0;
    }
    count as f64 / (span_secs as f64 / unit_secs)
}

/// Hold durations (seconds) from greedy first-match pairing.
fn holding_durations(ordered: &[&TradeRecord]) -> Vec<i64> {
    let mut open_buys: HashMap<MarketKey, VecDeque<i64>> = HashMap::new();
    let mut durations = Vec::new();

    for trade in ordered {
        let key = MarketKey::of(trade);
        match trade.side {
            TradeSide::Buy => open_buys.entry(key).or_default().push_back(trade.timestamp),
            TradeSide::Sell => {
                let Some(buys) = open_buys.get_mut(&key) else {
                    continue;
                };
                // Oldest buy is at the front; equal timestamps do not count
                if let Some(&bought_at) = buys.front() {
                    if bought_at < trade.timestamp {
                        buys.pop_front();
                        durations.push(trade.timestamp - bought_at);
                    }
                }
            }
        }
    }

    durations
}

fn most_active_hour(trades: &[TradeRecord]) -> Option<u32> {
    let mut per_hour = [0usize; 24];
    for trade in trades {
        if let Some(time) = DateTime::<Utc>::from_timestamp(trade.timestamp, 0) {
            per_hour[time.hour() as usize] += 1;
        }
    }

    // First hour wins ties
    let (hour, count) = per_hour
        .iter()
        .enumerate()
        .fold((0, 0), |best, (hour, &count)| {
            if count > best.1 {
                (hour, count)
            } else {
                best
            }
        });
    (count > 0).then_some(hour as u32)
}

/// Compute behavior metrics from the pooled trades (any order).
pub fn trading_behavior(trades: &[TradeRecord]) -> TradingBehavior {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|trade| trade.timestamp);

    let total_trades = ordered.len();
    let buy_count = ordered.iter().filter(|t| t.side == TradeSide::Buy).count();
    let sell_count = total_trades - buy_count;

    let first_trade_time = ordered.first().map(|t| t.timestamp);
    let last_trade_time = ordered.last().map(|t| t.timestamp);
    let span_secs = match (first_trade_time, last_trade_time) {
        (Some(first), Some(last)) => last - first,
        _ => 0,
    };

    let buy_sell_ratio = if sell_count == 0 {
        buy_count as f64
    } else {
        buy_count as f64 / sell_count as f64
    };

    let durations = holding_durations(&ordered);
    let avg_holding_time_hours = if durations.is_empty() {
        0.0
    } else {
        let total: i64 = durations.iter().sum();
        total as f64 / durations.len() as f64 / SECONDS_PER_HOUR
    };

    TradingBehavior {
        total_trades,
        buy_count,
        sell_count,
        buy_sell_ratio,
        trades_per_day: frequency(total_trades, span_secs, SECONDS_PER_DAY),
        trades_per_week: frequency(total_trades, span_secs, SECONDS_PER_WEEK),
        avg_holding_time_hours,
        matched_round_trips: durations.len(),
        most_active_hour_utc: most_active_hour(trades),
        first_trade_time,
        last_trade_time,
    }
}
