//! Journal summary: win rate, returns, drawdown and Sharpe over closed trades.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate performance over a set of closed trade legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSummary {
    /// When this summary was calculated
    pub calculated_at: DateTime<Utc>,

    // === Basic Statistics ===
    /// Total number of journaled legs (partials included)
    pub total_trades: u32,

    /// Number of partial booking legs
    pub partial_legs: u32,

    /// Total realized P&L in price units
    pub total_pnl: Decimal,

    // === Win/Loss Metrics ===
    pub winning_trades: u32,
    pub losing_trades: u32,

    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,

    /// Average per-leg return in percent
    pub avg_return_pct: Decimal,

    /// Sum of per-leg returns in percent
    pub total_return_pct: Decimal,

    /// Profit factor (gross profit / gross loss)
    pub profit_factor: f64,

    // === Risk Metrics ===
    /// Maximum drawdown of the cumulative P&L curve, absolute
    pub max_drawdown: Decimal,

    /// Mean / std-dev of per-leg returns
    pub sharpe_ratio: f64,

    /// Average holding period in minutes
    pub avg_holding_minutes: f64,

    /// Count of legs per exit reason label
    pub by_reason: BTreeMap<String, u32>,
}

impl TradeSummary {
    pub fn empty() -> Self {
        Self {
            calculated_at: Utc::now(),
            total_trades: 0,
            partial_legs: 0,
            total_pnl: Decimal::ZERO,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            avg_return_pct: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            profit_factor: 0.0,
            max_drawdown: Decimal::ZERO,
            sharpe_ratio: 0.0,
            avg_holding_minutes: 0.0,
            by_reason: BTreeMap::new(),
        }
    }

    /// Multi-line human-readable report, used by the CLI and the shutdown notification.
    pub fn render(&self, title: &str) -> String {
        let mut out = format!(
            "{}\nTrades: {} ({} partial)\nWins: {} | Losses: {} | Win rate: {:.1}%\n\
             Avg return: {:.2}% | Total return: {:.2}%\nTotal P&L: {:.2} | Profit factor: {:.2}\n\
             Max drawdown: {:.2} | Sharpe: {:.2} | Avg hold: {:.0} min",
            title,
            self.total_trades,
            self.partial_legs,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0,
            self.avg_return_pct,
            self.total_return_pct,
            self.total_pnl,
            self.profit_factor,
            self.max_drawdown,
            self.sharpe_ratio,
            self.avg_holding_minutes,
        );

        for (reason, count) in &self.by_reason {
            out.push_str(&format!("\n  {}: {}", reason, count));
        }

        out
    }
}

impl Default for TradeSummary {
    fn default() -> Self {
        Self::empty()
    }
}
