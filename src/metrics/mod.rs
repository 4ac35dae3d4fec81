//! Performance reporting over the trade journal.

mod calculator;

pub use calculator::SummaryCalculator;
