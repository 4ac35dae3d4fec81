//! tradeloop: intraday signal-to-position trading engine for OpenAlgo brokers.
//!
//! Each configured symbol runs its own loop: fetch bars, evaluate a signal,
//! gate the entry, then monitor the open position against stop, target and
//! trailing levels until it is closed and journaled.

mod api;
mod bot;
mod config;
mod db;
mod error;
mod metrics;
mod models;
mod trading;

#[cfg(test)]
mod testkit;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::OpenAlgoClient;
use crate::bot::Bot;
use crate::config::{AppConfig, Secrets};
use crate::db::Database;
use crate::metrics::SummaryCalculator;
use crate::models::Symbol;
use crate::trading::MarketDataPort;

/// Intraday trading engine CLI.
#[derive(Parser)]
#[command(name = "tradeloop")]
#[command(about = "Signal-driven intraday trading loop for OpenAlgo", long_about = None)]
struct Cli {
    /// Trade journal database URL
    #[arg(short, long, default_value = "sqlite:./tradeloop.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one trading loop per configured symbol
    Run {
        /// Config file (without extension is fine)
        #[arg(short, long)]
        config: Option<String>,

        /// Simulate fills instead of placing orders
        #[arg(long)]
        dry_run: bool,

        /// Trade only these symbols (EXCHANGE:TICKER), repeatable
        #[arg(short, long = "symbol")]
        symbols: Vec<Symbol>,
    },

    /// Show the resolved configuration
    Config {
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Summarize journaled trades
    Report {
        /// Days of history to include
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Print the last price and recent bars for a symbol
    Quote {
        /// EXCHANGE:TICKER
        symbol: Symbol,

        #[arg(short, long)]
        config: Option<String>,

        /// Number of bars to show
        #[arg(short, long, default_value = "5")]
        bars: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Err(_) => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            symbols,
        } => {
            let mut app_config = AppConfig::load(config.as_deref())?;
            app_config.engine.dry_run |= dry_run;
            app_config.restrict_symbols(&symbols)?;

            let secrets = Secrets::from_env();
            let bot = Bot::new(app_config.clone(), &secrets, &cli.database).await?;

            println!("\n=== tradeloop ===");
            println!("Broker:   {}", app_config.broker.host);
            println!(
                "Window:   {} - {} (UTC{:+}min)",
                app_config.session.start.format("%H:%M"),
                app_config.session.end.format("%H:%M"),
                app_config.session.utc_offset_minutes
            );
            println!(
                "Mode:     {}",
                if app_config.engine.dry_run { "DRY RUN (simulated fills)" } else { "LIVE TRADING" }
            );
            println!("Symbols:");
            for s in &app_config.symbols {
                println!("  {:<20} qty {}", s.symbol, s.quantity);
            }
            println!("\nPress Ctrl+C to stop.\n");

            let reports = bot.run().await?;

            let legs: usize = reports.iter().map(|r| r.closed.len()).sum();
            info!(symbols = reports.len(), legs, "Stopped");
        }

        Commands::Config { config } => {
            let app_config = AppConfig::load(config.as_deref())?;
            let secrets = Secrets::from_env();

            println!("\n=== Configuration ===\n");
            println!(
                "{}",
                serde_json::to_string_pretty(&app_config).context("Failed to render configuration")?
            );
            println!("\n{:?}", secrets);

            if let Err(e) = app_config.validate() {
                println!("\nWARNING: {}", e);
            }
        }

        Commands::Report { days } => {
            let db = Database::new(&cli.database).await?;
            let since = Utc::now() - Duration::days(days.max(1));
            let trades = db.closed_trades_since(since).await?;

            if trades.is_empty() {
                println!("No trades journaled in the last {} day(s).", days);
                return Ok(());
            }

            println!(
                "\n{:<16} {:<6} {:>5} {:>10} {:>10} {:>8}  {:<26} {}",
                "SYMBOL", "DIR", "QTY", "ENTRY", "EXIT", "RET%", "REASON", "EXIT TIME"
            );
            println!("{}", "-".repeat(110));

            for t in &trades {
                println!(
                    "{:<16} {:<6} {:>5} {:>10.2} {:>10.2} {:>7.2}%  {:<26} {}",
                    t.symbol.to_string(),
                    t.direction.as_str(),
                    t.quantity,
                    t.entry_price,
                    t.exit_price,
                    t.return_pct(),
                    t.reason.as_str(),
                    t.exit_time.format("%Y-%m-%d %H:%M")
                );
            }

            let summary = SummaryCalculator::calculate(&trades);
            println!("\n{}", summary.render(&format!("=== Last {} day(s) ===", days)));
            println!("\nLegs journaled overall: {}", db.trade_count().await?);
        }

        Commands::Quote {
            symbol,
            config,
            bars,
        } => {
            let app_config = AppConfig::load(config.as_deref())?;
            let secrets = Secrets::from_env();
            let client = OpenAlgoClient::new(&app_config.broker, secrets.api_key()?)?;

            let ltp = client
                .last_price(&symbol)
                .await
                .with_context(|| format!("Quote for {} failed", symbol))?;
            println!("\n{}  LTP {}", symbol, ltp);

            let lookback = Duration::days(i64::from(app_config.engine.lookback_days));
            let history = client
                .fetch(&symbol, &app_config.engine.bar_interval, lookback)
                .await
                .with_context(|| format!("History for {} failed", symbol))?;

            println!(
                "\n{:<17} {:>10} {:>10} {:>10} {:>10} {:>12}",
                "TIME (UTC)", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
            );
            println!("{}", "-".repeat(74));
            for bar in history.iter().rev().take(bars).rev() {
                println!(
                    "{:<17} {:>10} {:>10} {:>10} {:>10} {:>12}",
                    bar.timestamp.format("%Y-%m-%d %H:%M"),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
            println!("\n{} bars in the last {} day(s)", history.len(), app_config.engine.lookback_days);
        }
    }

    Ok(())
}
