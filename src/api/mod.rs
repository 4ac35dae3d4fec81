//! Broker, paper and notification adapters behind the trading ports.

mod client;
mod notify;
mod paper;
mod types;

pub use client::OpenAlgoClient;
pub use notify::{LogNotifier, TelegramNotifier};
pub use paper::PaperGateway;
