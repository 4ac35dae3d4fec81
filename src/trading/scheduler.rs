//! One control loop per symbol: fetch, evaluate, act, sleep.
//!
//! The scheduler exclusively owns the symbol's position state machine, daily
//! gate and entry retry policy. Ticks are strictly sequential; shutdown is
//! only observed between ticks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::gate::DailyGate;
use super::ports::Collaborators;
use super::position::{EntryAttempt, Phase, PositionStateMachine, TickOutcome};
use super::retry::EntryRetry;
use super::strategy::SignalEvaluator;
use crate::error::DataError;
use crate::models::{is_ordered_history, Bar, ClosedTrade, ExitReason, Signal, Symbol};

/// Exit attempts made while flattening at shutdown.
const SHUTDOWN_EXIT_ATTEMPTS: u32 = 3;

/// Scheduler-level phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    WaitingForWindow,
    Active,
}

/// What a symbol task hands back when it stops.
#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: Symbol,
    pub closed: Vec<ClosedTrade>,
    /// A position was still open when the loop exited
    pub left_open: bool,
}

pub struct SymbolScheduler {
    symbol: Symbol,
    quantity: u32,
    config: Arc<SchedulerConfig>,
    evaluator: Arc<dyn SignalEvaluator>,
    ports: Collaborators,
    position: PositionStateMachine,
    gate: DailyGate,
    retry: EntryRetry,
    window: WindowPhase,
    exit_alerted: bool,
    closed: Vec<ClosedTrade>,
}

impl SymbolScheduler {
    pub fn new(
        symbol: Symbol,
        quantity: u32,
        config: Arc<SchedulerConfig>,
        evaluator: Arc<dyn SignalEvaluator>,
        ports: Collaborators,
    ) -> Self {
        let call_timeout = StdDuration::from_secs(config.engine.call_timeout_secs);
        Self {
            position: PositionStateMachine::new(symbol.clone(), config.risk.clone(), call_timeout),
            gate: DailyGate::new(config.gate.clone(), config.session.clone()),
            retry: EntryRetry::new(&config.retry),
            symbol,
            quantity,
            config,
            evaluator,
            ports,
            window: WindowPhase::WaitingForWindow,
            exit_alerted: false,
            closed: Vec::new(),
        }
    }

    pub fn window(&self) -> WindowPhase {
        self.window
    }

    pub fn position(&self) -> &PositionStateMachine {
        &self.position
    }

    pub fn gate(&self) -> &DailyGate {
        &self.gate
    }

    fn call_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.config.engine.call_timeout_secs)
    }

    /// Drive ticks until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SymbolReport {
        info!(
            symbol = %self.symbol,
            quantity = self.quantity,
            evaluator = self.evaluator.name(),
            "Symbol loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.tick(Utc::now()).await;

            tokio::select! {
                _ = tokio::time::sleep(self.next_pause()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.shutdown(Utc::now()).await;
        info!(symbol = %self.symbol, closed_legs = self.closed.len(), "Symbol loop stopped");
        self.report()
    }

    fn next_pause(&self) -> StdDuration {
        let secs = if self.position.is_flat() {
            self.config.engine.poll_interval_secs
        } else {
            self.config.engine.monitor_interval_secs
        };
        StdDuration::from_secs(secs)
    }

    /// One poll-evaluate-act cycle at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        if self.gate.roll(now) {
            self.retry.reset();
            info!(symbol = %self.symbol, date = ?self.gate.session_date(), "New trading session");
        }
        self.update_window(now);

        // A pending exit needs no market data, only another submission
        if self.position.phase() == Phase::Closing {
            let outcome = self
                .position
                .on_tick(self.ports.gateway.as_ref(), Decimal::ZERO, now, false, false)
                .await;
            self.handle_outcome(outcome, now).await;
            return;
        }

        if self.position.is_flat() && self.window == WindowPhase::WaitingForWindow {
            return;
        }

        let bars = self.fetch_bars().await;

        if self.position.is_flat() {
            let Some(bars) = bars else {
                return;
            };
            let signal = self.evaluator.evaluate(&bars);
            self.maybe_enter(&signal, now).await;
            return;
        }

        let Some(price) = self.monitor_price(bars.as_deref()).await else {
            warn!(symbol = %self.symbol, "No price available, skipping monitoring tick");
            return;
        };

        let held = self.position.direction();
        let reversal = bars
            .as_deref()
            .map(|b| self.evaluator.evaluate(b))
            .is_some_and(|s| !s.direction.is_flat() && s.direction == held.opposite());
        let session_closing = self.gate.session_closing(now);

        debug!(symbol = %self.symbol, price = %price, reversal, session_closing, "Monitoring tick");

        let outcome = self
            .position
            .on_tick(self.ports.gateway.as_ref(), price, now, reversal, session_closing)
            .await;
        self.handle_outcome(outcome, now).await;
    }

    fn update_window(&mut self, now: DateTime<Utc>) {
        let phase = if self.gate.in_window(now) {
            WindowPhase::Active
        } else {
            WindowPhase::WaitingForWindow
        };

        if phase != self.window {
            info!(symbol = %self.symbol, phase = ?phase, "Session phase changed");
            self.window = phase;
        }
    }

    async fn fetch_bars(&self) -> Option<Vec<Bar>> {
        let lookback = Duration::days(i64::from(self.config.engine.lookback_days));
        let fetch = self
            .ports
            .market
            .fetch(&self.symbol, &self.config.engine.bar_interval, lookback);

        let result = timeout(self.call_timeout(), fetch)
            .await
            .unwrap_or_else(|_| Err(DataError::Timeout))
            .and_then(|bars| {
                if bars.is_empty() {
                    Err(DataError::Unavailable("empty bar history".to_string()))
                } else if !is_ordered_history(&bars) {
                    Err(DataError::Malformed("bars out of order or inconsistent".to_string()))
                } else {
                    Ok(bars)
                }
            });

        match result {
            Ok(bars) => Some(bars),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Market data unavailable, skipping tick");
                None
            }
        }
    }

    /// LTP, falling back to the last bar close.
    async fn monitor_price(&self, bars: Option<&[Bar]>) -> Option<Decimal> {
        let quote = timeout(self.call_timeout(), self.ports.market.last_price(&self.symbol))
            .await
            .unwrap_or_else(|_| Err(DataError::Timeout));

        match quote {
            Ok(price) if price > Decimal::ZERO => Some(price),
            Ok(price) => {
                warn!(symbol = %self.symbol, price = %price, "Ignoring non-positive quote");
                bars.and_then(|b| b.last()).map(|b| b.close)
            }
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "Quote unavailable, using last close");
                bars.and_then(|b| b.last()).map(|b| b.close)
            }
        }
    }

    async fn maybe_enter(&mut self, signal: &Signal, now: DateTime<Utc>) {
        if !signal.is_actionable() {
            return;
        }

        if let Err(block) = self.gate.check_entry(now) {
            debug!(symbol = %self.symbol, direction = %signal.direction, block = %block, "Entry blocked");
            return;
        }

        if !self.retry.allowed(now) {
            debug!(
                symbol = %self.symbol,
                failures = self.retry.consecutive_failures(),
                next_allowed = ?self.retry.next_allowed(),
                "Entry retry backoff active"
            );
            return;
        }

        let attempt = self
            .position
            .try_enter(self.ports.gateway.as_ref(), signal, self.quantity, now)
            .await;

        match attempt {
            EntryAttempt::Opened(fill) => {
                self.gate.record_entry(now);
                self.retry.on_success();
                self.exit_alerted = false;
                self.notify(format!(
                    "{} {} entry @ {} (qty {}), order {}",
                    self.symbol, signal.direction, fill.fill_price, self.quantity, fill.order_id
                ))
                .await;
            }
            EntryAttempt::Failed(e) => {
                self.retry.on_failure(now);
                if self.retry.is_exhausted() {
                    error!(
                        symbol = %self.symbol,
                        failures = self.retry.consecutive_failures(),
                        "Entry attempts exhausted, entries suspended until next session"
                    );
                    self.notify(format!(
                        "{}: entries suspended after repeated order failures ({})",
                        self.symbol, e
                    ))
                    .await;
                }
            }
            EntryAttempt::Skipped => {}
        }
    }

    async fn handle_outcome(&mut self, outcome: TickOutcome, now: DateTime<Utc>) {
        match outcome {
            TickOutcome::Idle | TickOutcome::Holding => {}
            TickOutcome::PartialBooked(leg) => {
                self.journal(&leg).await;
                self.notify(format!(
                    "{} partial booked: {} @ {} ({:.2}%)",
                    self.symbol,
                    leg.quantity,
                    leg.exit_price,
                    leg.return_pct()
                ))
                .await;
                self.closed.push(leg);
            }
            TickOutcome::PartialFailed(e) => {
                self.notify(format!("{} partial booking failed: {}", self.symbol, e))
                    .await;
            }
            TickOutcome::Closed {
                trade,
                position_return_pct,
            } => {
                self.gate.record_close(now, position_return_pct);
                self.exit_alerted = false;
                self.journal(&trade).await;
                self.notify(format!(
                    "{} {} exit @ {} ({}) {:.2}%",
                    self.symbol,
                    trade.direction,
                    trade.exit_price,
                    trade.reason,
                    trade.return_pct()
                ))
                .await;
                self.closed.push(trade);
            }
            TickOutcome::ExitFailed { reason, error } => {
                if !self.exit_alerted {
                    self.exit_alerted = true;
                    self.notify(format!(
                        "ALERT {}: exit ({}) failed: {}. Position still open, retrying every tick",
                        self.symbol, reason, error
                    ))
                    .await;
                }
            }
        }
    }

    /// Journal failures are logged and never affect position state.
    async fn journal(&self, trade: &ClosedTrade) {
        match timeout(self.call_timeout(), self.ports.journal.record(trade)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(symbol = %self.symbol, reason = %trade.reason, "Failed to journal trade: {:#}", e)
            }
            Err(_) => error!(symbol = %self.symbol, reason = %trade.reason, "Journal write timed out"),
        }
    }

    async fn notify(&self, text: String) {
        if timeout(self.call_timeout(), self.ports.notifier.send(&text))
            .await
            .is_err()
        {
            debug!(symbol = %self.symbol, "Notification timed out");
        }
    }

    async fn shutdown(&mut self, now: DateTime<Utc>) {
        if self.position.is_flat() {
            return;
        }

        if !self.config.engine.flatten_on_shutdown {
            match self.position.pending_exit() {
                Some(reason) => {
                    error!(
                        symbol = %self.symbol,
                        direction = %self.position.direction(),
                        reason = %reason,
                        "Shutting down with an unfilled exit; position is no longer monitored"
                    );
                    self.notify(format!(
                        "ALERT {}: shutdown before the {} exit filled, position still open and unmonitored",
                        self.symbol, reason
                    ))
                    .await;
                }
                None => {
                    warn!(symbol = %self.symbol, direction = %self.position.direction(), "Shutting down with an open position; it is no longer monitored");
                    self.notify(format!("{}: shutdown with open position, monitoring stopped", self.symbol))
                        .await;
                }
            }
            return;
        }

        for attempt in 1..=SHUTDOWN_EXIT_ATTEMPTS {
            let outcome = self
                .position
                .force_exit(self.ports.gateway.as_ref(), ExitReason::Shutdown, now)
                .await;
            self.handle_outcome(outcome, now).await;

            if self.position.is_flat() {
                return;
            }

            warn!(symbol = %self.symbol, attempt, "Shutdown exit failed");
            tokio::time::sleep(StdDuration::from_secs(self.config.engine.monitor_interval_secs)).await;
        }

        error!(symbol = %self.symbol, "Could not flatten position at shutdown");
        self.notify(format!("ALERT {}: could not flatten position at shutdown", self.symbol))
            .await;
    }

    fn report(self) -> SymbolReport {
        SymbolReport {
            left_open: !self.position.is_flat(),
            symbol: self.symbol,
            closed: self.closed,
        }
    }
}
