//! Trading configuration: risk distances, gating, session window and retry policy.

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How a price distance is derived at entry.
///
/// Resolved once against the entry fill price and the signal's volatility unit;
/// the state machine only works with the resulting absolute distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DistanceRule {
    /// Percent of entry price (2.0 means 2 %)
    Percent(Decimal),
    /// Multiple of the signal's risk distance (usually ATR)
    Atr(Decimal),
    /// Fixed price points
    Points(Decimal),
}

impl DistanceRule {
    /// Absolute price distance for a position entered at `entry_price`.
    ///
    /// An ATR rule with no volatility unit available resolves to zero, which
    /// callers treat as "rule disabled".
    pub fn resolve(&self, entry_price: Decimal, risk_unit: Decimal) -> Decimal {
        let distance = match *self {
            DistanceRule::Percent(pct) => entry_price * pct / Decimal::ONE_HUNDRED,
            DistanceRule::Atr(multiplier) => risk_unit * multiplier,
            DistanceRule::Points(points) => points,
        };
        distance.max(Decimal::ZERO)
    }

    /// Rule resolves to zero for every entry, whatever the volatility unit.
    pub fn is_zero(&self) -> bool {
        match *self {
            DistanceRule::Percent(v) | DistanceRule::Atr(v) | DistanceRule::Points(v) => {
                v <= Decimal::ZERO
            }
        }
    }
}

/// Partial profit booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    pub enabled: bool,

    /// Favorable move from entry at which the partial leg is booked
    pub threshold: DistanceRule,

    /// Fraction of the open quantity to book (0.0 to 1.0)
    pub fraction: Decimal,
}

impl Default for PartialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DistanceRule::Percent(dec!(0.5)),
            fraction: dec!(0.5),
        }
    }
}

/// Time-based exit for positions that go nowhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagnationConfig {
    pub enabled: bool,

    /// Minutes in position before the check applies
    pub after_mins: i64,

    /// Exit if |price - entry| stays inside this band
    pub band: DistanceRule,
}

impl Default for StagnationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            after_mins: 15,
            band: DistanceRule::Percent(dec!(0.2)),
        }
    }
}

/// Stop, target and trailing distances for every position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop: DistanceRule,
    pub target: DistanceRule,

    /// Favorable excursion from entry that arms the trailing stop
    pub trailing_trigger: DistanceRule,

    /// Distance of the trailing stop behind the peak favorable price
    pub trailing_stop: DistanceRule,

    pub partial: PartialConfig,
    pub stagnation: StagnationConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop: DistanceRule::Percent(dec!(2.0)),
            target: DistanceRule::Percent(dec!(4.0)),
            trailing_trigger: DistanceRule::Percent(dec!(1.0)),
            trailing_stop: DistanceRule::Percent(dec!(0.75)),
            partial: PartialConfig::default(),
            stagnation: StagnationConfig::default(),
        }
    }
}

/// Extra trades allowed past the daily cap after a profitable close.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitableException {
    pub enabled: bool,

    /// Minimum return (percent) of the last closed trade; 0 means any profit
    pub min_return_pct: Decimal,

    /// How many trades past the cap the exception may grant per day
    pub extra_trades: u32,
}

impl Default for ProfitableException {
    fn default() -> Self {
        Self {
            enabled: true,
            min_return_pct: Decimal::ZERO,
            extra_trades: 1,
        }
    }
}

/// Entry gating: cooldown and daily trade cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum seconds between the last trade event and a new entry
    pub cooldown_secs: i64,

    pub max_trades_per_day: u32,

    pub profitable_exception: ProfitableException,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 900,
            max_trades_per_day: 3,
            profitable_exception: ProfitableException::default(),
        }
    }
}

/// Wall-clock trading window in exchange local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// First minute new entries are allowed (`HH:MM`)
    #[serde(with = "hhmm")]
    pub start: NaiveTime,

    /// Entries stop here; open positions are squared off if `force_exit_at_close`
    #[serde(with = "hhmm")]
    pub end: NaiveTime,

    /// Exchange offset from UTC in minutes (330 for IST)
    pub utc_offset_minutes: i32,

    pub force_exit_at_close: bool,
}

impl SessionConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 20, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(15, 10, 0).unwrap_or_default(),
            utc_offset_minutes: 330,
            force_exit_at_close: true,
        }
    }
}

/// Retry policy for entry orders. Exits are retried every tick without bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub entry_initial_backoff_secs: u64,
    pub entry_max_backoff_secs: u64,

    /// Consecutive failed entries before entries are suspended for the day
    pub entry_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            entry_initial_backoff_secs: 30,
            entry_max_backoff_secs: 600,
            entry_max_attempts: 5,
        }
    }
}

/// Loop cadence and port-call bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bar interval passed to the market data port (e.g. "5m")
    pub bar_interval: String,

    /// Calendar days of history requested each cycle
    pub lookback_days: u32,

    /// Cadence while flat
    pub poll_interval_secs: u64,

    /// Cadence while a position is open
    pub monitor_interval_secs: u64,

    /// Bound on every market data, gateway and journal call
    pub call_timeout_secs: u64,

    /// Route orders to the paper gateway
    pub dry_run: bool,

    /// Close open positions when the process shuts down
    pub flatten_on_shutdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bar_interval: "5m".to_string(),
            lookback_days: 5,
            poll_interval_secs: 60,
            monitor_interval_secs: 5,
            call_timeout_secs: 10,
            dry_run: false,
            flatten_on_shutdown: false,
        }
    }
}

/// Everything one symbol scheduler needs, shared read-only across tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub risk: RiskConfig,
    pub gate: GateConfig,
    pub retry: RetryConfig,
}

/// Serde helpers for `HH:MM` (optionally `HH:MM:SS`) wall-clock times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .map_err(|e| format!("Invalid time '{}': {}", raw, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rule() {
        assert_eq!(DistanceRule::Percent(dec!(2)).resolve(dec!(100), dec!(3)), dec!(2));
        assert_eq!(DistanceRule::Percent(dec!(0.75)).resolve(dec!(200), dec!(3)), dec!(1.5));
    }

    #[test]
    fn test_atr_rule() {
        assert_eq!(DistanceRule::Atr(dec!(1.5)).resolve(dec!(100), dec!(2)), dec!(3.0));
        assert_eq!(DistanceRule::Atr(dec!(1.5)).resolve(dec!(100), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_points_rule() {
        assert_eq!(DistanceRule::Points(dec!(2.5)).resolve(dec!(100), dec!(9)), dec!(2.5));
        assert_eq!(DistanceRule::Points(dec!(-1)).resolve(dec!(100), dec!(9)), Decimal::ZERO);
    }

    #[test]
    fn test_zero_rules() {
        assert!(DistanceRule::Percent(Decimal::ZERO).is_zero());
        assert!(DistanceRule::Atr(Decimal::ZERO).is_zero());
        assert!(!DistanceRule::Atr(dec!(2)).is_zero());
        assert!(!DistanceRule::Points(dec!(0.5)).is_zero());
    }

    #[test]
    fn test_rule_deserialize() {
        let rule: DistanceRule =
            serde_json::from_str(r#"{"kind": "atr", "value": "2.0"}"#).unwrap();
        assert_eq!(rule, DistanceRule::Atr(dec!(2.0)));
    }

    #[test]
    fn test_session_times() {
        let session: SessionConfig = serde_json::from_str(
            r#"{"start": "09:15", "end": "15:00:00", "utc_offset_minutes": 330}"#,
        )
        .unwrap();
        assert_eq!(session.start, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(session.end, NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert!(session.force_exit_at_close);
        assert_eq!(session.offset().local_minus_utc(), 330 * 60);
    }

    #[test]
    fn test_hhmm_rejects_garbage() {
        assert!(hhmm::parse("9am").is_err());
    }
}
