//! Bot runner: wires the adapters into one scheduler task per symbol.
//!
//! Handles:
//! - Choosing live or paper execution
//! - Spawning and joining the symbol tasks
//! - Propagating Ctrl+C / SIGTERM as a cooperative shutdown
//! - The end-of-run summary

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{LogNotifier, OpenAlgoClient, PaperGateway, TelegramNotifier};
use crate::config::{AppConfig, Secrets};
use crate::db::Database;
use crate::metrics::SummaryCalculator;
use crate::models::ClosedTrade;
use crate::trading::{
    build_evaluator, Collaborators, Notifier, OrderGateway, SchedulerConfig, SignalEvaluator,
    SymbolReport, SymbolScheduler,
};

/// Main bot runner.
pub struct Bot {
    config: AppConfig,
    scheduler_config: Arc<SchedulerConfig>,
    evaluator: Arc<dyn SignalEvaluator>,
    ports: Collaborators,
}

impl Bot {
    /// Build every collaborator. Fails fast on bad config or a missing API key.
    pub async fn new(config: AppConfig, secrets: &Secrets, database_url: &str) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(OpenAlgoClient::new(&config.broker, secrets.api_key()?)?);
        let gateway: Arc<dyn OrderGateway> = if config.engine.dry_run {
            info!("Dry run: orders are simulated at the last traded price");
            Arc::new(PaperGateway::new(client.clone()))
        } else {
            client.clone()
        };

        let notifier: Arc<dyn Notifier> = match secrets.telegram() {
            Some((token, chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)?),
            None => {
                warn!("Telegram not configured, notifications go to the log");
                Arc::new(LogNotifier)
            }
        };

        let journal = Arc::new(
            Database::new(database_url)
                .await
                .context("Failed to open trade journal")?,
        );

        let evaluator: Arc<dyn SignalEvaluator> =
            Arc::from(build_evaluator(&config.strategy, config.session.offset())?);

        Ok(Self {
            scheduler_config: Arc::new(config.scheduler_config()),
            config,
            evaluator,
            ports: Collaborators {
                market: client,
                gateway,
                journal,
                notifier,
            },
        })
    }

    /// Run every symbol until a shutdown signal, then summarize.
    pub async fn run(self) -> Result<Vec<SymbolReport>> {
        info!(
            config = %self.config,
            evaluator = self.evaluator.name(),
            "Starting trading loop"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(self.config.symbols.len());
        for entry in &self.config.symbols {
            let scheduler = SymbolScheduler::new(
                entry.symbol.clone(),
                entry.quantity,
                self.scheduler_config.clone(),
                self.evaluator.clone(),
                self.ports.clone(),
            );
            tasks.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));
        }
        drop(shutdown_rx);

        self.ports
            .notifier
            .send(&format!(
                "tradeloop started: {} symbol(s), {}{}",
                self.config.symbols.len(),
                self.evaluator.name(),
                if self.config.engine.dry_run { " [DRY RUN]" } else { "" }
            ))
            .await;

        tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        });

        let mut reports = Vec::with_capacity(tasks.len());
        for result in join_all(tasks).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Symbol task failed"),
            }
        }

        self.summarize(&reports).await;
        Ok(reports)
    }

    async fn summarize(&self, reports: &[SymbolReport]) {
        let mut trades: Vec<ClosedTrade> =
            reports.iter().flat_map(|r| r.closed.iter().cloned()).collect();
        trades.sort_by_key(|t| t.exit_time);

        let summary = SummaryCalculator::calculate(&trades);
        let open: Vec<String> = reports
            .iter()
            .filter(|r| r.left_open)
            .map(|r| r.symbol.to_string())
            .collect();

        info!(
            trades = summary.total_trades,
            pnl = %summary.total_pnl,
            win_rate = summary.win_rate,
            left_open = open.len(),
            "Session summary"
        );

        let mut text = summary.render("Session summary");
        if !open.is_empty() {
            text.push_str(&format!("\nStill open: {}", open.join(", ")));
        }
        self.ports.notifier.send(&text).await;
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the only way out is killing the process
        error!(error = %e, "Ctrl+C handler failed");
        futures::future::pending::<()>().await;
    }
}
