//! Data models for symbols, bars, signals, orders, closed trades and summaries.

mod bar;
mod metrics;
mod order;
mod signal;
mod symbol;
mod trade;

pub use bar::{is_ordered_history, Bar};
pub use metrics::TradeSummary;
pub use order::{Fill, IntentPurpose, OrderAction, OrderIntent};
pub use signal::{Direction, Signal};
pub use symbol::Symbol;
pub use trade::{ClosedTrade, ExitReason};

#[cfg(test)]
pub(crate) use bar::fixtures;
