//! Signal evaluation: the evaluator contract and the built-in strategies.
//!
//! An evaluator turns an ordered bar history into a [`Signal`]. It is pure:
//! no I/O, no hidden state carried between calls, and identical input always
//! produces an identical signal. Too little history yields a Flat signal.

mod ema_trend;
mod opening_range;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Bar, Signal};

pub use ema_trend::{EmaTrend, EmaTrendParams};
pub use opening_range::{OpeningRange, OpeningRangeParams};

/// Snapshot-in, signal-out strategy contract.
pub trait SignalEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Bars required before any non-flat signal can be produced.
    fn min_history(&self) -> usize;

    fn evaluate(&self, history: &[Bar]) -> Signal;
}

/// Which evaluator to run and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    EmaTrend(EmaTrendParams),
    OpeningRange(OpeningRangeParams),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::EmaTrend(EmaTrendParams::default())
    }
}

/// Build the configured evaluator. Fails on invalid indicator periods.
pub fn build_evaluator(
    config: &StrategyConfig,
    session_offset: FixedOffset,
) -> Result<Box<dyn SignalEvaluator>> {
    let evaluator: Box<dyn SignalEvaluator> = match config {
        StrategyConfig::EmaTrend(params) => Box::new(EmaTrend::new(params.clone())?),
        StrategyConfig::OpeningRange(params) => {
            Box::new(OpeningRange::new(params.clone(), session_offset)?)
        }
    };
    Ok(evaluator)
}

/// Timestamp of the newest bar, or the epoch floor for an empty history.
fn evaluated_at(history: &[Bar]) -> DateTime<Utc> {
    history
        .last()
        .map(|b| b.timestamp)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(4))
        .unwrap_or(Decimal::ZERO)
}
