//! Shared data models for trade history.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Parse the provider's side string ("BUY"/"SELL", any case).
    pub fn parse(side: &str) -> Option<Self> {
        match side.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// Which upstream history endpoint to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryKind {
    /// Matched trades only
    #[default]
    Trades,
    /// Full activity feed; only TRADE rows are kept
    Activity,
}

impl HistoryKind {
    pub fn path(&self) -> &'static str {
        match self {
            HistoryKind::Trades => "trades",
            HistoryKind::Activity => "activity",
        }
    }
}

/// One matched trade. Never mutated after the fetcher produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    /// Wallet the trade was fetched for (lower-cased)
    pub wallet: String,
    pub condition_id: String,
    pub market_slug: String,
    pub title: String,
    /// Unix seconds
    pub timestamp: i64,
    pub side: TradeSide,
    /// Always positive; direction comes from `side`
    pub shares: Decimal,
    /// Share price in [0, 1]
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl TradeRecord {
    /// Notional value of the trade (shares * price).
    pub fn value(&self) -> Decimal {
        self.shares * self.price
    }

    pub fn is_buy(&self) -> bool {
        self.side == TradeSide::Buy
    }
}

/// Query for one wallet's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeFilter {
    pub user: String,
    pub market_slug: Option<String>,
    pub condition_id: Option<String>,
    /// Inclusive lower bound, Unix seconds
    pub start_time: Option<i64>,
    /// Inclusive upper bound, Unix seconds
    pub end_time: Option<i64>,
}

impl TradeFilter {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_time_range(mut self, start_time: Option<i64>, end_time: Option<i64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Check a record against the optional market and time constraints.
    pub fn matches(&self, record: &TradeRecord) -> bool {
        if let Some(start) = self.start_time {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.timestamp > end {
                return false;
            }
        }
        if let Some(slug) = &self.market_slug {
            if &record.market_slug != slug {
                return false;
            }
        }
        if let Some(condition_id) = &self.condition_id {
            if !record.condition_id.eq_ignore_ascii_case(condition_id) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(timestamp: i64) -> TradeRecord {
        TradeRecord {
            wallet: "0xabc".to_string(),
            condition_id: "0xCOND".to_string(),
            market_slug: "will-it-rain".to_string(),
            title: "Will it rain?".to_string(),
            timestamp,
            side: TradeSide::Buy,
            shares: dec!(10),
            price: dec!(0.45),
            outcome: None,
            transaction_hash: None,
        }
    }

    #[test]
    fn test_trade_side_parse() {
        assert_eq!(TradeSide::parse("BUY"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("sell"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse(" Buy "), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("REDEEM"), None);
    }

    #[test]
    fn test_trade_record_value() {
        assert_eq!(record(0).value(), dec!(4.5));
    }

    #[test]
    fn test_filter_time_range_is_inclusive() {
        let filter = TradeFilter::for_user("0xabc").with_time_range(Some(100), Some(200));

        assert!(!filter.matches(&record(99)));
        assert!(filter.matches(&record(100)));
        assert!(filter.matches(&record(200)));
        assert!(!filter.matches(&record(201)));
    }

    #[test]
    fn test_filter_market_constraints() {
        let mut filter = TradeFilter::for_user("0xabc");
        filter.condition_id = Some("0xcond".to_string());
        assert!(filter.matches(&record(0)));

        filter.market_slug = Some("other-market".to_string());
        assert!(!filter.matches(&record(0)));
    }

    #[test]
    fn test_trade_record_serializes_camel_case() {
        let json = serde_json::to_value(record(5)).unwrap();
        assert_eq!(json["conditionId"], "0xCOND");
        assert_eq!(json["marketSlug"], "will-it-rain");
        assert_eq!(json["side"], "BUY");
        assert!(json.get("outcome").is_none());
    }
}
