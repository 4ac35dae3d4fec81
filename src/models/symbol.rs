//! Exchange + ticker identity that keys all per-symbol state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tradable instrument on a specific exchange (e.g. `NSE:SBIN`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    exchange: String,
    ticker: String,
}

impl Symbol {
    pub fn new(exchange: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into().to_uppercase(),
            ticker: ticker.into().to_uppercase(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.ticker)
    }
}

impl FromStr for Symbol {
    type Err = String;

    /// Parses `EXCHANGE:TICKER`. A bare ticker defaults to NSE.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (exchange, ticker) = match s.split_once(':') {
            Some((e, t)) => (e.trim(), t.trim()),
            None => ("NSE", s),
        };

        if exchange.is_empty() || ticker.is_empty() {
            return Err(format!("Invalid symbol '{}', expected EXCHANGE:TICKER", s));
        }

        Ok(Self::new(exchange, ticker))
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
