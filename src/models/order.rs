//! Order intents emitted by the position state machine and gateway fills.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Broker order action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Buy => "BUY",
            OrderAction::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> OrderAction {
        match self {
            OrderAction::Buy => OrderAction::Sell,
            OrderAction::Sell => OrderAction::Buy,
        }
    }
}

/// Why an intent was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentPurpose {
    Entry,
    PartialExit,
    Exit,
}

/// A single market order to be executed by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub action: OrderAction,
    pub quantity: u32,
    pub purpose: IntentPurpose,
    /// Price the engine acted on; last-resort fill price when the broker reports none
    pub reference_price: Decimal,
}

impl OrderIntent {
    pub fn market(
        symbol: Symbol,
        action: OrderAction,
        quantity: u32,
        purpose: IntentPurpose,
        reference_price: Decimal,
    ) -> Self {
        Self {
            symbol,
            action,
            quantity,
            purpose,
            reference_price,
        }
    }
}

/// Confirmed execution returned by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub fill_price: Decimal,
}
