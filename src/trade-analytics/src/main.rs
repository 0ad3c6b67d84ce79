//! Trade Analytics CLI
//!
//! Fetches the full trade history of one or more wallets from the Polymarket
//! data API (rate limited), rebuilds every market position with FIFO lot
//! matching, and prints the requested view as JSON on stdout.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, HistoryFetcher, HistoryKind, RateLimiter};
use trade_analytics::{AnalyticsRequest, AnalyticsService, DataApiHistorySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum View {
    /// Market summaries, overall stats and trading behavior together
    Report,
    Markets,
    Stats,
    Behavior,
}

/// Trade Analytics - P&L and trading behavior for Polymarket wallets
#[derive(Parser, Debug)]
#[command(name = "trade-analytics")]
#[command(about = "Reconstructs positions and P&L from wallet trade history")]
struct Args {
    /// Wallet addresses (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    wallets: Vec<String>,

    /// Only trades at or after this Unix timestamp
    #[arg(long)]
    start: Option<i64>,

    /// Only trades at or before this Unix timestamp
    #[arg(long)]
    end: Option<i64>,

    /// Which view to print
    #[arg(long, value_enum, default_value = "report")]
    view: View,

    /// Read the activity feed instead of the trades endpoint
    #[arg(long)]
    activity: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with RUST_LOG env var support (default: info).
    // Logs go to stderr so stdout carries only JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    info!("Trade Analytics starting...");
    info!("Wallets: {}", args.wallets.len());

    let config = Config::from_env()?;
    info!(
        "Data API: {} (min interval {:?})",
        config.data_api_url, config.rate_limit_interval
    );

    // One limiter for the whole process; every request goes through it
    let limiter = Arc::new(RateLimiter::from_config(&config));
    let fetcher = HistoryFetcher::new(&config, Arc::clone(&limiter))?;
    let kind = if args.activity {
        HistoryKind::Activity
    } else {
        HistoryKind::Trades
    };
    let service = AnalyticsService::new(DataApiHistorySource::new(fetcher, kind));

    let request = AnalyticsRequest {
        wallet_addresses: args.wallets.clone(),
        start_time: args.start,
        end_time: args.end,
    };

    // Always one fetch cycle per wallet; narrower views are cut from the report
    let report = service.get_report(&request).await?;
    info!(
        "Computed {} markets, total P&L {}",
        report.market_summaries.len(),
        report.overall_stats.total_pnl
    );

    let output = match args.view {
        View::Report => to_json(&report, args.pretty)?,
        View::Markets => to_json(&report.market_summaries, args.pretty)?,
        View::Stats => to_json(&report.overall_stats, args.pretty)?,
        View::Behavior => to_json(&report.trading_behavior, args.pretty)?,
    };
    println!("{}", output);

    let status = limiter.status();
    info!(
        "Done (limiter queued={}, running={})",
        status.queued, status.running
    );

    Ok(())
}
