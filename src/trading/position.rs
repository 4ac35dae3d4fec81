//! Position lifecycle for one symbol: FLAT -> ENTERING -> OPEN -> CLOSING -> FLAT.
//!
//! ENTERING and CLOSING exist only while a gateway call is in flight. A failed
//! entry drops back to FLAT with nothing recorded. A failed exit stays in
//! CLOSING and is re-submitted on every later tick until a fill arrives.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::config::RiskConfig;
use super::ports::OrderGateway;
use super::risk::{RiskLevels, RiskState, TrailUpdate};
use crate::error::GatewayError;
use crate::models::{
    ClosedTrade, Direction, ExitReason, Fill, IntentPurpose, OrderIntent, Signal, Symbol,
};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Flat,
    Entering,
    Open,
    Closing,
}

/// Result of an entry attempt.
#[derive(Debug)]
pub enum EntryAttempt {
    Opened(Fill),
    /// Not flat, no direction, or no stop-loss could be placed
    Skipped,
    Failed(GatewayError),
}

/// Result of one monitoring tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing to monitor
    Idle,
    Holding,
    PartialBooked(ClosedTrade),
    /// Partial leg failed; the flag is consumed and the full position stays open
    PartialFailed(GatewayError),
    Closed {
        trade: ClosedTrade,
        /// Return of the whole position including partial legs, in percent
        position_return_pct: Decimal,
    },
    ExitFailed {
        reason: ExitReason,
        error: GatewayError,
    },
}

/// Owns the single RiskState of one symbol and talks to the order gateway.
pub struct PositionStateMachine {
    symbol: Symbol,
    risk: RiskConfig,
    call_timeout: StdDuration,
    phase: Phase,
    state: Option<RiskState>,
    pending_exit: Option<ExitReason>,
    initial_quantity: u32,
    realized_pnl: Decimal,
    /// Last monitored price, used as the reference for exit intents
    last_price: Decimal,
}

impl PositionStateMachine {
    pub fn new(symbol: Symbol, risk: RiskConfig, call_timeout: StdDuration) -> Self {
        Self {
            symbol,
            risk,
            call_timeout,
            phase: Phase::Flat,
            state: None,
            pending_exit: None,
            initial_quantity: 0,
            realized_pnl: Decimal::ZERO,
            last_price: Decimal::ZERO,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_flat(&self) -> bool {
        self.phase == Phase::Flat
    }

    pub fn risk_state(&self) -> Option<&RiskState> {
        self.state.as_ref()
    }

    /// Exit that was triggered but has not filled yet.
    pub fn pending_exit(&self) -> Option<ExitReason> {
        self.pending_exit
    }

    pub fn direction(&self) -> Direction {
        self.state
            .as_ref()
            .map(RiskState::direction)
            .unwrap_or(Direction::Flat)
    }

    /// Submit an entry for `signal`. Levels are resolved from the actual fill price.
    pub async fn try_enter(
        &mut self,
        gateway: &dyn OrderGateway,
        signal: &Signal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> EntryAttempt {
        if !self.is_flat() || !signal.is_actionable() || quantity == 0 {
            return EntryAttempt::Skipped;
        }
        let Some(action) = signal.direction.entry_action() else {
            return EntryAttempt::Skipped;
        };

        let planned = RiskLevels::resolve(&self.risk, signal.reference_price, signal.risk_distance);
        if planned.stop_distance <= Decimal::ZERO {
            warn!(
                symbol = %self.symbol,
                direction = %signal.direction,
                risk_distance = %signal.risk_distance,
                "Entry skipped: stop-loss distance resolves to zero"
            );
            return EntryAttempt::Skipped;
        }

        self.phase = Phase::Entering;
        let intent = OrderIntent::market(
            self.symbol.clone(),
            action,
            quantity,
            IntentPurpose::Entry,
            signal.reference_price,
        );

        match self.submit(gateway, &intent).await {
            Ok(fill) => {
                let levels = RiskLevels::resolve(&self.risk, fill.fill_price, signal.risk_distance);
                let state = RiskState::open(signal.direction, quantity, fill.fill_price, now, &levels);

                info!(
                    symbol = %self.symbol,
                    direction = %signal.direction,
                    quantity,
                    entry = %fill.fill_price,
                    stop = ?state.stop_price(),
                    target = ?state.target_price(),
                    order_id = %fill.order_id,
                    "Position opened"
                );

                self.state = Some(state);
                self.initial_quantity = quantity;
                self.realized_pnl = Decimal::ZERO;
                self.last_price = fill.fill_price;
                self.phase = Phase::Open;
                EntryAttempt::Opened(fill)
            }
            Err(e) => {
                warn!(symbol = %self.symbol, direction = %signal.direction, error = %e, "Entry order failed");
                self.phase = Phase::Flat;
                EntryAttempt::Failed(e)
            }
        }
    }

    /// Process one price tick while a position exists.
    ///
    /// Exit conditions are checked before partial booking; a tick never does both.
    pub async fn on_tick(
        &mut self,
        gateway: &dyn OrderGateway,
        price: Decimal,
        now: DateTime<Utc>,
        reversal: bool,
        session_closing: bool,
    ) -> TickOutcome {
        match self.phase {
            Phase::Flat | Phase::Entering => return TickOutcome::Idle,
            Phase::Closing => {
                let reason = self.pending_exit.unwrap_or(ExitReason::StopLoss);
                return self.close(gateway, reason, now).await;
            }
            Phase::Open => {}
        }

        if price > Decimal::ZERO {
            self.last_price = price;
        }

        let Some(state) = self.state.as_mut() else {
            self.phase = Phase::Flat;
            return TickOutcome::Idle;
        };

        match state.update(price) {
            TrailUpdate::Armed(level) => {
                info!(symbol = %self.symbol, price = %price, trailing_stop = %level, "Trailing stop armed")
            }
            TrailUpdate::Tightened { from, to } => {
                debug!(symbol = %self.symbol, from = %from, to = %to, "Trailing stop tightened")
            }
            TrailUpdate::Unchanged => {}
        }

        if let Some(reason) = state.exit_condition(price, now, reversal, session_closing) {
            info!(
                symbol = %self.symbol,
                price = %price,
                reason = %reason,
                unrealized_pct = %state.unrealized_pct(price).round_dp(2),
                "Exit condition met"
            );
            self.phase = Phase::Closing;
            self.pending_exit = Some(reason);
            return self.close(gateway, reason, now).await;
        }

        if state.partial_due(price) {
            return self.book_partial(gateway, price, now).await;
        }

        TickOutcome::Holding
    }

    /// Close the position regardless of price levels (shutdown or operator request).
    pub async fn force_exit(
        &mut self,
        gateway: &dyn OrderGateway,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        match self.phase {
            Phase::Open => {
                self.phase = Phase::Closing;
                self.pending_exit = Some(reason);
                self.close(gateway, reason, now).await
            }
            Phase::Closing => {
                let reason = self.pending_exit.unwrap_or(reason);
                self.close(gateway, reason, now).await
            }
            Phase::Flat | Phase::Entering => TickOutcome::Idle,
        }
    }

    async fn book_partial(
        &mut self,
        gateway: &dyn OrderGateway,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Idle;
        };

        let Some(quantity) = state.partial_quantity(self.risk.partial.fraction) else {
            debug!(symbol = %self.symbol, open = state.quantity(), "Partial booking skipped: quantity too small");
            state.book_partial(0);
            return TickOutcome::Holding;
        };

        let Some(action) = state.direction().exit_action() else {
            return TickOutcome::Idle;
        };
        let intent = OrderIntent::market(
            self.symbol.clone(),
            action,
            quantity,
            IntentPurpose::PartialExit,
            price,
        );

        let result = Self::submit_with(gateway, &intent, self.call_timeout).await;

        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Idle;
        };

        match result {
            Ok(fill) => {
                state.book_partial(quantity);
                let leg = ClosedTrade {
                    symbol: self.symbol.clone(),
                    direction: state.direction(),
                    quantity,
                    entry_price: state.entry_price(),
                    exit_price: fill.fill_price,
                    entry_time: state.entry_time(),
                    exit_time: now,
                    reason: ExitReason::PartialBooking,
                    partial: true,
                };
                self.realized_pnl += leg.pnl();

                info!(
                    symbol = %self.symbol,
                    quantity,
                    price = %fill.fill_price,
                    remaining = state.quantity(),
                    "Partial profit booked"
                );
                TickOutcome::PartialBooked(leg)
            }
            Err(e) => {
                warn!(symbol = %self.symbol, trigger_price = %price, error = %e, "Partial booking failed, keeping full position");
                state.book_partial(0);
                TickOutcome::PartialFailed(e)
            }
        }
    }

    async fn close(
        &mut self,
        gateway: &dyn OrderGateway,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let Some(state) = self.state.as_ref() else {
            self.phase = Phase::Flat;
            self.pending_exit = None;
            return TickOutcome::Idle;
        };

        let Some(action) = state.direction().exit_action() else {
            return TickOutcome::Idle;
        };
        let intent = OrderIntent::market(
            self.symbol.clone(),
            action,
            state.quantity(),
            IntentPurpose::Exit,
            self.last_price,
        );

        match self.submit(gateway, &intent).await {
            Ok(fill) => {
                let Some(state) = self.state.take() else {
                    return TickOutcome::Idle;
                };

                let trade = ClosedTrade {
                    symbol: self.symbol.clone(),
                    direction: state.direction(),
                    quantity: state.quantity(),
                    entry_price: state.entry_price(),
                    exit_price: fill.fill_price,
                    entry_time: state.entry_time(),
                    exit_time: now,
                    reason,
                    partial: false,
                };

                let total_pnl = self.realized_pnl + trade.pnl();
                let notional = state.entry_price() * Decimal::from(self.initial_quantity.max(1));
                let position_return_pct = if notional.is_zero() {
                    Decimal::ZERO
                } else {
                    total_pnl / notional * Decimal::ONE_HUNDRED
                };

                info!(
                    symbol = %self.symbol,
                    reason = %reason,
                    exit = %fill.fill_price,
                    return_pct = %trade.return_pct().round_dp(2),
                    "Position closed"
                );

                self.phase = Phase::Flat;
                self.pending_exit = None;
                self.initial_quantity = 0;
                self.realized_pnl = Decimal::ZERO;

                TickOutcome::Closed {
                    trade,
                    position_return_pct,
                }
            }
            Err(e) => {
                error!(
                    symbol = %self.symbol,
                    reason = %reason,
                    error = %e,
                    "Exit order failed, position still open; retrying next tick"
                );
                TickOutcome::ExitFailed { reason, error: e }
            }
        }
    }

    async fn submit(&self, gateway: &dyn OrderGateway, intent: &OrderIntent) -> Result<Fill, GatewayError> {
        Self::submit_with(gateway, intent, self.call_timeout).await
    }

    async fn submit_with(
        gateway: &dyn OrderGateway,
        intent: &OrderIntent,
        call_timeout: StdDuration,
    ) -> Result<Fill, GatewayError> {
        match tokio::time::timeout(call_timeout, gateway.submit(intent)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }
}
