//! EMA trend with RSI confirmation; ATR is the risk unit.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex};
use ta::{DataItem, Next};

use super::{evaluated_at, from_f64, to_f64, SignalEvaluator};
use crate::models::{is_ordered_history, Bar, Direction, Signal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaTrendParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,

    /// RSI at or above this confirms a long
    pub rsi_bull: f64,

    /// RSI at or below this confirms a short
    pub rsi_bear: f64,

    /// Minimum ATR as percent of close; quieter markets stay flat
    pub min_atr_pct: f64,
}

impl Default for EmaTrendParams {
    fn default() -> Self {
        Self {
            fast_period: 13,
            slow_period: 62,
            rsi_period: 14,
            atr_period: 14,
            rsi_bull: 51.0,
            rsi_bear: 49.0,
            min_atr_pct: 0.1,
        }
    }
}

/// Long when fast EMA > slow EMA with RSI above the bull level, short on the mirror.
pub struct EmaTrend {
    params: EmaTrendParams,
}

impl EmaTrend {
    pub fn new(params: EmaTrendParams) -> Result<Self> {
        if params.fast_period >= params.slow_period {
            bail!(
                "fast_period ({}) must be below slow_period ({})",
                params.fast_period,
                params.slow_period
            );
        }
        ExponentialMovingAverage::new(params.fast_period)
            .map_err(|e| anyhow!("Invalid fast_period: {:?}", e))?;
        RelativeStrengthIndex::new(params.rsi_period)
            .map_err(|e| anyhow!("Invalid rsi_period: {:?}", e))?;
        AverageTrueRange::new(params.atr_period)
            .map_err(|e| anyhow!("Invalid atr_period: {:?}", e))?;

        Ok(Self { params })
    }
}

struct Readings {
    fast: f64,
    slow: f64,
    rsi: f64,
    atr: f64,
    close: f64,
}

impl EmaTrend {
    fn readings(&self, history: &[Bar]) -> Option<Readings> {
        let p = &self.params;
        let mut fast = ExponentialMovingAverage::new(p.fast_period).ok()?;
        let mut slow = ExponentialMovingAverage::new(p.slow_period).ok()?;
        let mut rsi = RelativeStrengthIndex::new(p.rsi_period).ok()?;
        let mut atr = AverageTrueRange::new(p.atr_period).ok()?;

        let mut last = None;
        for bar in history {
            let close = to_f64(bar.close);
            let item = DataItem::builder()
                .open(to_f64(bar.open))
                .high(to_f64(bar.high))
                .low(to_f64(bar.low))
                .close(close)
                .volume(to_f64(bar.volume))
                .build()
                .ok()?;

            last = Some(Readings {
                fast: fast.next(close),
                slow: slow.next(close),
                rsi: rsi.next(close),
                atr: atr.next(&item),
                close,
            });
        }
        last
    }
}

impl SignalEvaluator for EmaTrend {
    fn name(&self) -> &str {
        "ema_trend"
    }

    fn min_history(&self) -> usize {
        self.params.slow_period + 2
    }

    fn evaluate(&self, history: &[Bar]) -> Signal {
        let at = evaluated_at(history);
        if history.len() < self.min_history() || !is_ordered_history(history) {
            return Signal::flat(at);
        }

        let Some(r) = self.readings(history) else {
            return Signal::flat(at);
        };

        if r.close <= 0.0 || r.atr / r.close * 100.0 < self.params.min_atr_pct {
            return Signal::flat(at);
        }

        let direction = if r.fast > r.slow && r.rsi >= self.params.rsi_bull {
            Direction::Long
        } else if r.fast < r.slow && r.rsi <= self.params.rsi_bear {
            Direction::Short
        } else {
            Direction::Flat
        };

        if direction.is_flat() {
            return Signal::flat(at);
        }

        Signal {
            direction,
            reference_price: history[history.len() - 1].close,
            risk_distance: from_f64(r.atr),
            evaluated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::bars_from_closes;
    use rust_decimal::Decimal;

    fn params() -> EmaTrendParams {
        EmaTrendParams {
            fast_period: 5,
            slow_period: 20,
            ..EmaTrendParams::default()
        }
    }

    fn series(start: i64, step: i64, n: usize) -> Vec<Bar> {
        let closes: Vec<Decimal> = (0..n as i64)
            .map(|i| Decimal::from(start + step * i))
            .collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn test_uptrend_is_long() {
        let evaluator = EmaTrend::new(params()).unwrap();
        let bars = series(100, 1, 40);
        let signal = evaluator.evaluate(&bars);

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.reference_price, Decimal::from(139));
        assert!(signal.risk_distance > Decimal::ZERO);
        assert_eq!(signal.evaluated_at, bars[39].timestamp);
    }

    #[test]
    fn test_downtrend_is_short() {
        let evaluator = EmaTrend::new(params()).unwrap();
        let signal = evaluator.evaluate(&series(300, -1, 40));
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_insufficient_history_is_flat() {
        let evaluator = EmaTrend::new(params()).unwrap();
        let signal = evaluator.evaluate(&series(100, 1, 21));
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn test_deterministic() {
        let evaluator = EmaTrend::new(params()).unwrap();
        let bars = series(100, 1, 40);
        assert_eq!(evaluator.evaluate(&bars), evaluator.evaluate(&bars));
    }

    #[test]
    fn test_rejects_bad_periods() {
        assert!(EmaTrend::new(EmaTrendParams {
            fast_period: 30,
            slow_period: 20,
            ..EmaTrendParams::default()
        })
        .is_err());
        assert!(EmaTrend::new(EmaTrendParams {
            rsi_period: 0,
            ..params()
        })
        .is_err());
    }
}
