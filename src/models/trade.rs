//! Closed trade legs and the reasons a position is exited.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, Symbol};

/// Why a position (or part of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    Target,
    TrailingStop,
    Reversal,
    Stagnation,
    SessionClose,
    Shutdown,
    PartialBooking,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "Stop Loss Hit",
            ExitReason::Target => "Target Hit",
            ExitReason::TrailingStop => "Trailing Stop Hit",
            ExitReason::Reversal => "Signal Reversal",
            ExitReason::Stagnation => "Time-Based Exit",
            ExitReason::SessionClose => "Auto Exit - Market Close",
            ExitReason::Shutdown => "Shutdown Exit",
            ExitReason::PartialBooking => "Partial Profit Booked",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ExitReason::StopLoss,
            ExitReason::Target,
            ExitReason::TrailingStop,
            ExitReason::Reversal,
            ExitReason::Stagnation,
            ExitReason::SessionClose,
            ExitReason::Shutdown,
            ExitReason::PartialBooking,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
        .ok_or_else(|| format!("Unknown exit reason: {}", s))
    }
}

/// One closed (or partially closed) leg, as written to the trade journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: Symbol,

    /// Direction of the position this leg belonged to
    pub direction: Direction,

    /// Quantity closed by this leg
    pub quantity: u32,

    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,

    pub reason: ExitReason,

    /// True for a partial booking leg; the runner stays open
    pub partial: bool,
}

impl ClosedTrade {
    /// Return in percent of entry price, signed for the position direction.
    pub fn return_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.direction.favorable_move(self.entry_price, self.exit_price) / self.entry_price
            * Decimal::ONE_HUNDRED
    }

    /// Realized P&L for this leg in price units.
    pub fn pnl(&self) -> Decimal {
        self.direction.favorable_move(self.entry_price, self.exit_price)
            * Decimal::from(self.quantity)
    }

    /// Holding period in minutes.
    pub fn holding_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn trade(direction: Direction, entry: Decimal, exit: Decimal) -> ClosedTrade {
        let entry_time = Utc::now();
        ClosedTrade {
            symbol: Symbol::new("NSE", "SBIN"),
            direction,
            quantity: 10,
            entry_price: entry,
            exit_price: exit,
            entry_time,
            exit_time: entry_time + Duration::minutes(25),
            reason: ExitReason::Target,
            partial: false,
        }
    }

    #[test]
    fn test_long_pnl() {
        let t = trade(Direction::Long, dec!(100), dec!(101.20));
        assert_eq!(t.return_pct(), dec!(1.20));
        assert_eq!(t.pnl(), dec!(12.00));
        assert_eq!(t.holding_minutes(), 25);
    }

    #[test]
    fn test_short_pnl() {
        let t = trade(Direction::Short, dec!(200), dec!(204));
        assert_eq!(t.return_pct(), dec!(-2));
        assert_eq!(t.pnl(), dec!(-40));
    }

    #[test]
    fn test_reason_round_trip() {
        assert_eq!(ExitReason::TrailingStop.to_string(), "Trailing Stop Hit");
        assert_eq!(
            "Auto Exit - Market Close".parse::<ExitReason>().unwrap(),
            ExitReason::SessionClose
        );
        assert!("nope".parse::<ExitReason>().is_err());
    }
}
