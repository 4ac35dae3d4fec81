//! Direction and per-cycle signal produced by a signal evaluator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderAction;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Flat => "FLAT",
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Direction::Flat)
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Flat => Direction::Flat,
        }
    }

    /// Order action that opens a position in this direction.
    pub fn entry_action(&self) -> Option<OrderAction> {
        match self {
            Direction::Long => Some(OrderAction::Buy),
            Direction::Short => Some(OrderAction::Sell),
            Direction::Flat => None,
        }
    }

    /// Order action that reduces or closes a position in this direction.
    pub fn exit_action(&self) -> Option<OrderAction> {
        self.entry_action().map(|a| a.opposite())
    }

    /// Signed move from `from` to `to`, positive when favorable.
    pub fn favorable_move(&self, from: Decimal, to: Decimal) -> Decimal {
        match self {
            Direction::Long => to - from,
            Direction::Short => from - to,
            Direction::Flat => Decimal::ZERO,
        }
    }

    /// Price `distance` away from `base` toward profit.
    pub fn toward_profit(&self, base: Decimal, distance: Decimal) -> Decimal {
        match self {
            Direction::Long => base + distance,
            Direction::Short => base - distance,
            Direction::Flat => base,
        }
    }

    /// Price `distance` away from `base` toward loss.
    pub fn toward_loss(&self, base: Decimal, distance: Decimal) -> Decimal {
        match self {
            Direction::Long => base - distance,
            Direction::Short => base + distance,
            Direction::Flat => base,
        }
    }

    /// True if `a` is at least as favorable as `b`.
    pub fn at_or_beyond(&self, a: Decimal, b: Decimal) -> bool {
        match self {
            Direction::Long => a >= b,
            Direction::Short => a <= b,
            Direction::Flat => false,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            "FLAT" => Ok(Direction::Flat),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Output of one evaluation cycle. Never persisted across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub direction: Direction,
    /// Entry reference price (usually the last close)
    pub reference_price: Decimal,
    /// Volatility unit used by ATR-based distance rules
    pub risk_distance: Decimal,
    pub evaluated_at: DateTime<Utc>,
}

impl Signal {
    pub fn flat(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            direction: Direction::Flat,
            reference_price: Decimal::ZERO,
            risk_distance: Decimal::ZERO,
            evaluated_at,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !self.direction.is_flat() && self.reference_price > Decimal::ZERO
    }
}
