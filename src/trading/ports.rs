//! Collaborator seams: market data, order execution, trade journal and notifications.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::{DataError, GatewayError};
use crate::models::{Bar, ClosedTrade, Fill, OrderIntent, Symbol};

/// Source of bars and last-traded prices.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Bars for `symbol` at `interval` covering `lookback`, ascending by timestamp.
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: &str,
        lookback: Duration,
    ) -> Result<Vec<Bar>, DataError>;

    /// Last traded price, used for sub-bar monitoring.
    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal, DataError>;
}

/// Executes order intents. One call is one submission; callers own retries.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, GatewayError>;
}

/// Append-only record of closed legs.
#[async_trait]
pub trait TradeJournal: Send + Sync {
    async fn record(&self, trade: &ClosedTrade) -> anyhow::Result<()>;
}

/// Best-effort alerting. Implementations swallow their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Shared handles to every collaborator a symbol task needs.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataPort>,
    pub gateway: Arc<dyn OrderGateway>,
    pub journal: Arc<dyn TradeJournal>,
    pub notifier: Arc<dyn Notifier>,
}
