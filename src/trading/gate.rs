//! Per-symbol entry gating: trading window, cooldown and daily trade cap.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::config::{GateConfig, SessionConfig};

/// Why an entry was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum GateBlock {
    OutsideWindow,
    Cooldown { remaining: Duration },
    DailyCap { trades_today: u32 },
}

impl fmt::Display for GateBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateBlock::OutsideWindow => write!(f, "outside trading window"),
            GateBlock::Cooldown { remaining } => {
                write!(f, "cooldown active ({}s remaining)", remaining.num_seconds())
            }
            GateBlock::DailyCap { trades_today } => {
                write!(f, "daily trade cap reached ({} trades)", trades_today)
            }
        }
    }
}

/// Daily counters for one symbol. Owned by its scheduler; reset on local date change.
#[derive(Debug, Clone)]
pub struct DailyGate {
    gate: GateConfig,
    session: SessionConfig,
    session_date: Option<NaiveDate>,
    trades_today: u32,
    last_trade_time: Option<DateTime<Utc>>,
    /// Return (percent) of the most recently closed position today
    last_closed_return: Option<Decimal>,
}

impl DailyGate {
    pub fn new(gate: GateConfig, session: SessionConfig) -> Self {
        Self {
            gate,
            session,
            session_date: None,
            trades_today: 0,
            last_trade_time: None,
            last_closed_return: None,
        }
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }

    pub fn last_trade_time(&self) -> Option<DateTime<Utc>> {
        self.last_trade_time
    }

    pub fn session_date(&self) -> Option<NaiveDate> {
        self.session_date
    }

    /// Local exchange date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.session.offset()).date_naive()
    }

    /// Reset counters when the local date changes. Returns true on rollover.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let today = self.local_date(now);
        if self.session_date == Some(today) {
            return false;
        }

        self.session_date = Some(today);
        self.trades_today = 0;
        self.last_trade_time = None;
        self.last_closed_return = None;
        true
    }

    /// Inside `[start, end)` local time.
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.session.offset()).time();
        local >= self.session.start && local < self.session.end
    }

    /// At or past the session end: open positions get squared off if configured.
    pub fn session_closing(&self, now: DateTime<Utc>) -> bool {
        self.session.force_exit_at_close
            && now.with_timezone(&self.session.offset()).time() >= self.session.end
    }

    /// Check every entry gate at `now`.
    pub fn check_entry(&self, now: DateTime<Utc>) -> Result<(), GateBlock> {
        if !self.in_window(now) {
            return Err(GateBlock::OutsideWindow);
        }

        if let Some(last) = self.last_trade_time {
            let cooldown = Duration::seconds(self.gate.cooldown_secs);
            let elapsed = now - last;
            if elapsed < cooldown {
                return Err(GateBlock::Cooldown {
                    remaining: cooldown - elapsed,
                });
            }
        }

        if self.trades_today >= self.gate.max_trades_per_day && !self.exception_applies() {
            return Err(GateBlock::DailyCap {
                trades_today: self.trades_today,
            });
        }

        Ok(())
    }

    /// One extra trade past the cap per qualifying profitable close, up to `extra_trades`.
    fn exception_applies(&self) -> bool {
        let exception = &self.gate.profitable_exception;
        if !exception.enabled {
            return false;
        }

        let cap = self.gate.max_trades_per_day + exception.extra_trades;
        let profitable = self.last_closed_return.is_some_and(|r| {
            r > Decimal::ZERO && r >= exception.min_return_pct
        });

        profitable && self.trades_today < cap
    }

    /// A position was opened.
    pub fn record_entry(&mut self, now: DateTime<Utc>) {
        self.trades_today += 1;
        self.last_trade_time = Some(now);
    }

    /// A position was fully closed with the given overall return in percent.
    pub fn record_close(&mut self, now: DateTime<Utc>, return_pct: Decimal) {
        self.last_trade_time = Some(now);
        self.last_closed_return = Some(return_pct);
    }
}
