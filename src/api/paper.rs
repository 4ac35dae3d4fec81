//! Simulated order execution for dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::models::{Fill, OrderIntent};
use crate::trading::{MarketDataPort, OrderGateway};

/// Fills every intent at the current LTP. Never touches the broker.
pub struct PaperGateway {
    market: Arc<dyn MarketDataPort>,
}

impl PaperGateway {
    pub fn new(market: Arc<dyn MarketDataPort>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, GatewayError> {
        let fill_price = match self.market.last_price(&intent.symbol).await {
            Ok(ltp) => ltp,
            Err(e) => {
                warn!(symbol = %intent.symbol, error = %e, "[DRY RUN] No quote, filling at reference price");
                intent.reference_price
            }
        };

        let order_id = format!("paper-{}", Uuid::new_v4());
        info!(
            symbol = %intent.symbol,
            action = intent.action.as_str(),
            quantity = intent.quantity,
            price = %fill_price,
            order_id = %order_id,
            "[DRY RUN] Simulated fill"
        );

        Ok(Fill {
            order_id,
            fill_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntentPurpose, OrderAction, Symbol};
    use crate::testkit::ScriptedMarket;
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent::market(
            Symbol::new("NSE", "SBIN"),
            OrderAction::Buy,
            10,
            IntentPurpose::Entry,
            dec!(800),
        )
    }

    #[tokio::test]
    async fn test_fills_at_ltp() {
        let market = Arc::new(ScriptedMarket::new(Vec::new()));
        market.set_price(dec!(801.25));
        let gateway = PaperGateway::new(market);

        let fill = gateway.submit(&intent()).await.unwrap();
        assert_eq!(fill.fill_price, dec!(801.25));
        assert!(fill.order_id.starts_with("paper-"));
    }

    #[tokio::test]
    async fn test_falls_back_to_reference_price() {
        let gateway = PaperGateway::new(Arc::new(ScriptedMarket::new(Vec::new())));
        let fill = tokio_test::assert_ok!(gateway.submit(&intent()).await);
        assert_eq!(fill.fill_price, dec!(800));
    }
}
