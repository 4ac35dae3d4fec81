//! OHLCV bars as returned by the market data port.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV candle. Read-only once produced by the market data port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl Bar {
    /// Bar has positive prices and a consistent high/low envelope.
    pub fn is_well_formed(&self) -> bool {
        self.low > Decimal::ZERO
            && self.high >= self.low
            && self.open >= self.low
            && self.open <= self.high
            && self.close >= self.low
            && self.close <= self.high
    }
}

/// Check that a bar sequence is strictly ascending in time and every bar is well formed.
pub fn is_ordered_history(bars: &[Bar]) -> bool {
    bars.iter().all(Bar::is_well_formed)
        && bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Five-minute bars starting 2025-06-02 03:45 UTC (09:15 IST), one per close.
    pub fn bars_from_closes(closes: &[Decimal]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 3, 45, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open,
                    high: open.max(close) + Decimal::new(5, 1),
                    low: open.min(close) - Decimal::new(5, 1),
                    close,
                    volume: Decimal::from(1000),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::bars_from_closes;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ordered_history() {
        let bars = bars_from_closes(&[dec!(100), dec!(101), dec!(102)]);
        assert!(is_ordered_history(&bars));

        let mut reversed = bars.clone();
        reversed.reverse();
        assert!(!is_ordered_history(&reversed));
    }

    #[test]
    fn test_malformed_bar() {
        let mut bars = bars_from_closes(&[dec!(100)]);
        bars[0].high = dec!(90);
        assert!(!bars[0].is_well_formed());
        assert!(!is_ordered_history(&bars));
    }
}
