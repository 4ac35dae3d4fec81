//! Calculator for journal performance: win rate, returns, drawdown, Sharpe.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{ClosedTrade, TradeSummary};

/// Computes a [`TradeSummary`] from closed trade legs.
pub struct SummaryCalculator;

impl SummaryCalculator {
    /// Summarize `trades`, which are expected in exit order.
    ///
    /// Partial legs count as trades of their own, as they are in the journal.
    pub fn calculate(trades: &[ClosedTrade]) -> TradeSummary {
        let mut summary = TradeSummary::empty();

        if trades.is_empty() {
            return summary;
        }

        summary.total_trades = trades.len() as u32;
        summary.partial_legs = trades.iter().filter(|t| t.partial).count() as u32;

        let pnls: Vec<Decimal> = trades.iter().map(ClosedTrade::pnl).collect();
        let returns: Vec<Decimal> = trades.iter().map(ClosedTrade::return_pct).collect();

        Self::calculate_pnl_metrics(&mut summary, &pnls);
        Self::calculate_return_metrics(&mut summary, &returns);
        Self::calculate_drawdown(&mut summary, &pnls);

        let holding: Vec<f64> = trades.iter().map(|t| t.holding_minutes() as f64).collect();
        summary.avg_holding_minutes = holding.mean();

        let mut by_reason = BTreeMap::new();
        for trade in trades {
            *by_reason.entry(trade.reason.as_str().to_string()).or_insert(0) += 1;
        }
        summary.by_reason = by_reason;

        summary.calculated_at = Utc::now();
        summary
    }

    fn calculate_pnl_metrics(summary: &mut TradeSummary, pnls: &[Decimal]) {
        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().copied().partition(|p| *p > Decimal::ZERO);

        summary.winning_trades = wins.len() as u32;
        summary.losing_trades = losses.iter().filter(|p| **p < Decimal::ZERO).count() as u32;
        summary.total_pnl = pnls.iter().copied().sum();
        summary.win_rate = wins.len() as f64 / pnls.len() as f64;

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();
        if gross_loss > Decimal::ZERO {
            summary.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        }
    }

    fn calculate_return_metrics(summary: &mut TradeSummary, returns: &[Decimal]) {
        summary.total_return_pct = returns.iter().copied().sum();
        summary.avg_return_pct = (summary.total_return_pct / Decimal::from(returns.len() as u32))
            .round_dp(4);

        if returns.len() < 2 {
            return;
        }

        let values: Vec<f64> = returns.iter().filter_map(|r| r.to_f64()).collect();
        let mean = values.clone().mean();
        let std_dev = values.std_dev();

        // Per-trade, not annualized
        if std_dev > 0.0 {
            summary.sharpe_ratio = mean / std_dev;
        }
    }

    /// Largest peak-to-trough fall of the cumulative P&L curve.
    fn calculate_drawdown(summary: &mut TradeSummary, pnls: &[Decimal]) {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;

        for pnl in pnls {
            equity += pnl;
            if equity > peak {
                peak = equity;
            }
            let dd = peak - equity;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        summary.max_drawdown = max_dd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitReason, Symbol};
    use chrono::{DateTime, Duration};
    use rust_decimal_macros::dec;

    fn leg(entry: Decimal, exit: Decimal, reason: ExitReason, partial: bool) -> ClosedTrade {
        let entry_time: DateTime<Utc> = Utc::now();
        ClosedTrade {
            symbol: Symbol::new("NSE", "INFY"),
            direction: Direction::Long,
            quantity: 10,
            entry_price: entry,
            exit_price: exit,
            entry_time,
            exit_time: entry_time + Duration::minutes(30),
            reason,
            partial,
        }
    }

    #[test]
    fn test_empty_journal() {
        let summary = SummaryCalculator::calculate(&[]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.total_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_pnl_metrics() {
        let trades = vec![
            leg(dec!(100), dec!(110), ExitReason::Target, false),       // +100
            leg(dec!(100), dec!(95), ExitReason::StopLoss, false),      // -50
            leg(dec!(100), dec!(120), ExitReason::Target, false),       // +200
            leg(dec!(100), dec!(97), ExitReason::StopLoss, false),      // -30
            leg(dec!(100), dec!(115), ExitReason::PartialBooking, true), // +150
        ];

        let summary = SummaryCalculator::calculate(&trades);

        assert_eq!(summary.total_trades, 5);
        assert_eq!(summary.partial_legs, 1);
        assert_eq!(summary.winning_trades, 3);
        assert_eq!(summary.losing_trades, 2);
        assert_eq!(summary.total_pnl, dec!(370));
        assert!((summary.win_rate - 0.6).abs() < 0.001);
        assert!((summary.profit_factor - 450.0 / 80.0).abs() < 0.001);
        assert_eq!(summary.total_return_pct, dec!(37));
        assert_eq!(summary.avg_return_pct, dec!(7.4));
        assert_eq!(summary.by_reason.get("Stop Loss Hit"), Some(&2));
        assert!((summary.avg_holding_minutes - 30.0).abs() < 0.001);
        assert!(summary.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_drawdown() {
        let trades = vec![
            leg(dec!(100), dec!(110), ExitReason::Target, false),   // equity 100
            leg(dec!(100), dec!(105), ExitReason::Target, false),   // 150
            leg(dec!(100), dec!(92), ExitReason::StopLoss, false),  // 70
            leg(dec!(100), dec!(98), ExitReason::StopLoss, false),  // 50
            leg(dec!(100), dec!(110), ExitReason::Target, false),   // 150
        ];

        let summary = SummaryCalculator::calculate(&trades);
        assert_eq!(summary.max_drawdown, dec!(100));
    }

    #[test]
    fn test_breakeven_is_neither_win_nor_loss() {
        let trades = vec![leg(dec!(100), dec!(100), ExitReason::Stagnation, false)];
        let summary = SummaryCalculator::calculate(&trades);
        assert_eq!(summary.winning_trades, 0);
        assert_eq!(summary.losing_trades, 0);
        assert_eq!(summary.sharpe_ratio, 0.0);
    }
}
