//! Opening-range breakout: the first N bars of the session set a high/low band.

use anyhow::{bail, Result};
use chrono::FixedOffset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{evaluated_at, SignalEvaluator};
use crate::models::{is_ordered_history, Bar, Direction, Signal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningRangeParams {
    /// Bars of the current session that form the range (3 x 5m = 09:15-09:30)
    pub range_bars: usize,

    /// Breakout buffer beyond the range, percent
    pub buffer_pct: Decimal,
}

impl Default for OpeningRangeParams {
    fn default() -> Self {
        Self {
            range_bars: 3,
            buffer_pct: dec!(0.1),
        }
    }
}

pub struct OpeningRange {
    params: OpeningRangeParams,
    offset: FixedOffset,
}

impl OpeningRange {
    pub fn new(params: OpeningRangeParams, offset: FixedOffset) -> Result<Self> {
        if params.range_bars == 0 {
            bail!("range_bars must be at least 1");
        }
        if params.buffer_pct < Decimal::ZERO {
            bail!("buffer_pct must not be negative");
        }
        Ok(Self { params, offset })
    }

    /// Bars belonging to the same local session date as the newest bar.
    fn session_bars<'a>(&self, history: &'a [Bar]) -> &'a [Bar] {
        let Some(last) = history.last() else {
            return history;
        };
        let day = last.timestamp.with_timezone(&self.offset).date_naive();
        let start = history
            .iter()
            .rposition(|b| b.timestamp.with_timezone(&self.offset).date_naive() != day)
            .map(|i| i + 1)
            .unwrap_or(0);
        &history[start..]
    }
}

impl SignalEvaluator for OpeningRange {
    fn name(&self) -> &str {
        "opening_range"
    }

    fn min_history(&self) -> usize {
        self.params.range_bars + 1
    }

    fn evaluate(&self, history: &[Bar]) -> Signal {
        let at = evaluated_at(history);
        if !is_ordered_history(history) {
            return Signal::flat(at);
        }

        let session = self.session_bars(history);
        if session.len() < self.min_history() {
            return Signal::flat(at);
        }

        let range = &session[..self.params.range_bars];
        let high = range.iter().map(|b| b.high).fold(Decimal::MIN, Decimal::max);
        let low = range.iter().map(|b| b.low).fold(Decimal::MAX, Decimal::min);

        let buffer = self.params.buffer_pct / Decimal::ONE_HUNDRED;
        let long_level = high * (Decimal::ONE + buffer);
        let short_level = low * (Decimal::ONE - buffer);

        let close = session[session.len() - 1].close;
        let direction = if close > long_level {
            Direction::Long
        } else if close < short_level {
            Direction::Short
        } else {
            return Signal::flat(at);
        };

        Signal {
            direction,
            reference_price: close,
            risk_distance: high - low,
            evaluated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::bars_from_closes;
    use chrono::Duration;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn evaluator() -> OpeningRange {
        OpeningRange::new(OpeningRangeParams::default(), ist()).unwrap()
    }

    #[test]
    fn test_breakout_long() {
        // Range bars: 100, 100.5, 100.2 -> high 101.0, low 99.5
        let bars = bars_from_closes(&[dec!(100), dec!(100.5), dec!(100.2), dec!(101.5)]);
        let signal = evaluator().evaluate(&bars);

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.reference_price, dec!(101.5));
        assert_eq!(signal.risk_distance, dec!(1.5));
    }

    #[test]
    fn test_breakdown_short() {
        let bars = bars_from_closes(&[dec!(100), dec!(100.5), dec!(100.2), dec!(99.3)]);
        assert_eq!(evaluator().evaluate(&bars).direction, Direction::Short);
    }

    #[test]
    fn test_buffer_holds_inside() {
        // 101.05 is above the range high but inside the 0.1 % buffer
        let bars = bars_from_closes(&[dec!(100), dec!(100.5), dec!(100.2), dec!(101.05)]);
        assert_eq!(evaluator().evaluate(&bars).direction, Direction::Flat);
    }

    #[test]
    fn test_range_not_complete() {
        let bars = bars_from_closes(&[dec!(100), dec!(100.5), dec!(105)]);
        assert_eq!(evaluator().evaluate(&bars).direction, Direction::Flat);
    }

    #[test]
    fn test_uses_current_session_only() {
        let mut bars = bars_from_closes(&[dec!(50), dec!(50), dec!(50), dec!(50), dec!(100), dec!(100.5)]);
        for bar in bars.iter_mut().take(4) {
            bar.timestamp -= Duration::days(1);
        }
        // Today has only two bars: no range yet, yesterday is ignored
        assert_eq!(evaluator().evaluate(&bars).direction, Direction::Flat);
    }
}
