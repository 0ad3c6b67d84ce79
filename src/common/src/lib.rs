//! Common library for the trade analytics services.
//!
//! Provides shared functionality:
//! - Configuration loading from .env
//! - Process-wide rate limiter for upstream requests
//! - Data API client and complete wallet history fetcher
//! - Shared trade models

pub mod config;
pub mod data_api;
pub mod history;
pub mod models;
pub mod rate_limiter;

pub use config::{Config, ConfigError};
pub use data_api::{DataApiClient, DataApiError, DataApiRecord, Page};
pub use history::HistoryFetcher;
pub use models::{HistoryKind, TradeFilter, TradeRecord, TradeSide};
pub use rate_limiter::{LimiterError, LimiterStatus, RateLimiter, MIN_INTERVAL, TASK_TIMEOUT};
