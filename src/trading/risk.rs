//! Per-position risk record and the trailing-stop update algorithm.
//!
//! All distances are resolved once at entry. After that the state only adds
//! and compares prices:
//! - the peak favorable price only moves toward profit
//! - once armed, the trailing stop only tightens toward the peak
//! - stop and target never change after entry

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::config::RiskConfig;
use crate::models::{Direction, ExitReason};

/// Absolute price distances derived from the risk config at entry.
///
/// A zero distance disables the corresponding level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub stop_distance: Decimal,
    pub target_distance: Decimal,
    pub trigger_distance: Decimal,
    pub trail_distance: Decimal,
    pub partial_distance: Option<Decimal>,
    pub stagnation: Option<(Duration, Decimal)>,
}

impl RiskLevels {
    /// Resolve every distance rule against the entry fill and the signal's volatility unit.
    pub fn resolve(config: &RiskConfig, entry_price: Decimal, risk_unit: Decimal) -> Self {
        let partial_distance = config
            .partial
            .enabled
            .then(|| config.partial.threshold.resolve(entry_price, risk_unit))
            .filter(|d| *d > Decimal::ZERO);

        let stagnation = config.stagnation.enabled.then(|| {
            (
                Duration::minutes(config.stagnation.after_mins),
                config.stagnation.band.resolve(entry_price, risk_unit),
            )
        });

        Self {
            stop_distance: config.stop.resolve(entry_price, risk_unit),
            target_distance: config.target.resolve(entry_price, risk_unit),
            trigger_distance: config.trailing_trigger.resolve(entry_price, risk_unit),
            trail_distance: config.trailing_stop.resolve(entry_price, risk_unit),
            partial_distance,
            stagnation,
        }
    }
}

/// What a price update did to the trailing stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailUpdate {
    Unchanged,
    Armed(Decimal),
    Tightened { from: Decimal, to: Decimal },
}

/// Mutable risk record of one open position.
///
/// Fields are private: the only mutations are [`RiskState::update`] and
/// [`RiskState::book_partial`], which keep the monotonic invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskState {
    direction: Direction,
    quantity: u32,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
    stop_price: Option<Decimal>,
    target_price: Option<Decimal>,
    trailing_trigger_price: Option<Decimal>,
    trailing_stop_price: Option<Decimal>,
    trail_distance: Decimal,
    peak_favorable_price: Decimal,
    partial_price: Option<Decimal>,
    partial_booked: bool,
    stagnation: Option<(Duration, Decimal)>,
}

impl RiskState {
    /// Build the record at entry confirmation. Stop and target are set here and nowhere else.
    pub fn open(
        direction: Direction,
        quantity: u32,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        levels: &RiskLevels,
    ) -> Self {
        let level = |distance: Decimal, toward_profit: bool| {
            (distance > Decimal::ZERO).then(|| {
                if toward_profit {
                    direction.toward_profit(entry_price, distance)
                } else {
                    direction.toward_loss(entry_price, distance)
                }
            })
        };

        let trailing_enabled = levels.trail_distance > Decimal::ZERO;

        Self {
            direction,
            quantity,
            entry_price,
            entry_time,
            stop_price: level(levels.stop_distance, false),
            target_price: level(levels.target_distance, true),
            trailing_trigger_price: trailing_enabled
                .then(|| direction.toward_profit(entry_price, levels.trigger_distance)),
            trailing_stop_price: None,
            trail_distance: levels.trail_distance,
            peak_favorable_price: entry_price,
            partial_price: levels
                .partial_distance
                .map(|d| direction.toward_profit(entry_price, d)),
            partial_booked: false,
            stagnation: levels.stagnation,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    pub fn target_price(&self) -> Option<Decimal> {
        self.target_price
    }

    pub fn trailing_trigger_price(&self) -> Option<Decimal> {
        self.trailing_trigger_price
    }

    pub fn trailing_stop_price(&self) -> Option<Decimal> {
        self.trailing_stop_price
    }

    pub fn peak_favorable_price(&self) -> Decimal {
        self.peak_favorable_price
    }

    pub fn partial_booked(&self) -> bool {
        self.partial_booked
    }

    /// Unrealized return in percent at `price`.
    pub fn unrealized_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.direction.favorable_move(self.entry_price, price) / self.entry_price
            * Decimal::ONE_HUNDRED
    }

    /// Apply one price tick: move the peak toward profit, then arm or tighten the trail.
    pub fn update(&mut self, price: Decimal) -> TrailUpdate {
        if self.direction.favorable_move(self.peak_favorable_price, price) > Decimal::ZERO {
            self.peak_favorable_price = price;
        }

        let Some(trigger) = self.trailing_trigger_price else {
            return TrailUpdate::Unchanged;
        };

        let candidate = self
            .direction
            .toward_loss(self.peak_favorable_price, self.trail_distance);

        match self.trailing_stop_price {
            None if self.direction.at_or_beyond(self.peak_favorable_price, trigger) => {
                self.trailing_stop_price = Some(candidate);
                TrailUpdate::Armed(candidate)
            }
            Some(current)
                if self.direction.favorable_move(current, candidate) > Decimal::ZERO =>
            {
                self.trailing_stop_price = Some(candidate);
                TrailUpdate::Tightened {
                    from: current,
                    to: candidate,
                }
            }
            _ => TrailUpdate::Unchanged,
        }
    }

    /// First full-exit condition that holds at `price`, in precedence order:
    /// stop, target, trailing stop, reversal, stagnation, session close.
    pub fn exit_condition(
        &self,
        price: Decimal,
        now: DateTime<Utc>,
        reversal: bool,
        session_closing: bool,
    ) -> Option<ExitReason> {
        let d = self.direction;

        if self.stop_price.is_some_and(|stop| d.at_or_beyond(stop, price)) {
            return Some(ExitReason::StopLoss);
        }
        if self.target_price.is_some_and(|target| d.at_or_beyond(price, target)) {
            return Some(ExitReason::Target);
        }
        if self.trailing_stop_price.is_some_and(|trail| d.at_or_beyond(trail, price)) {
            return Some(ExitReason::TrailingStop);
        }
        if reversal {
            return Some(ExitReason::Reversal);
        }
        if let Some((after, band)) = self.stagnation {
            if now - self.entry_time >= after && (price - self.entry_price).abs() < band {
                return Some(ExitReason::Stagnation);
            }
        }
        if session_closing {
            return Some(ExitReason::SessionClose);
        }
        None
    }

    /// True when the partial threshold is crossed and no partial leg has been booked yet.
    pub fn partial_due(&self, price: Decimal) -> bool {
        !self.partial_booked
            && self
                .partial_price
                .is_some_and(|level| self.direction.at_or_beyond(price, level))
    }

    /// Quantity for the partial leg: `floor(quantity * fraction)`, at least one and
    /// strictly less than the open quantity.
    pub fn partial_quantity(&self, fraction: Decimal) -> Option<u32> {
        let qty = (Decimal::from(self.quantity) * fraction).floor().to_u32()?;
        (qty >= 1 && qty < self.quantity).then_some(qty)
    }

    /// Consume the single partial booking. `filled` is the quantity actually closed
    /// (zero when the leg was skipped or failed).
    pub fn book_partial(&mut self, filled: u32) {
        self.partial_booked = true;
        self.quantity = self.quantity.saturating_sub(filled);
    }

    #[cfg(test)]
    pub(crate) fn with_levels(
        mut self,
        stop: Option<Decimal>,
        target: Option<Decimal>,
        trailing: Option<Decimal>,
    ) -> Self {
        self.stop_price = stop;
        self.target_price = target;
        self.trailing_stop_price = trailing;
        self
    }
}
