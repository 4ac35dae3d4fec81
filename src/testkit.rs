//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::{DataError, GatewayError};
use crate::models::{Bar, ClosedTrade, Fill, OrderIntent, Symbol};
use crate::trading::{Collaborators, MarketDataPort, Notifier, OrderGateway, TradeJournal};

/// Gateway that fills at a settable price and fails on demand.
#[derive(Default)]
pub struct ScriptedGateway {
    inner: Mutex<GatewayScript>,
}

#[derive(Default)]
struct GatewayScript {
    fill_price: Decimal,
    failures: VecDeque<GatewayError>,
    submitted: Vec<OrderIntent>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price used for every fill from now on.
    pub fn fill_at(&self, price: Decimal) {
        self.inner.lock().unwrap().fill_price = price;
    }

    pub fn reject_next(&self, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push_back(GatewayError::Rejected(reason.to_string()));
    }

    pub fn timeout_next(&self) {
        self.inner.lock().unwrap().failures.push_back(GatewayError::Timeout);
    }

    pub fn submitted(&self) -> Vec<OrderIntent> {
        self.inner.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, GatewayError> {
        let mut script = self.inner.lock().unwrap();
        script.submitted.push(intent.clone());
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        Ok(Fill {
            order_id: format!("T{}", script.submitted.len()),
            fill_price: script.fill_price,
        })
    }
}

/// Market data with a fixed bar history and a settable last price.
#[derive(Default)]
pub struct ScriptedMarket {
    inner: Mutex<MarketScript>,
}

#[derive(Default)]
struct MarketScript {
    bars: Vec<Bar>,
    price: Option<Decimal>,
    fail_next: u32,
    fetches: u32,
}

impl ScriptedMarket {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            inner: Mutex::new(MarketScript {
                bars,
                ..MarketScript::default()
            }),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        self.inner.lock().unwrap().price = Some(price);
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        self.inner.lock().unwrap().bars = bars;
    }

    pub fn fail_next(&self, times: u32) {
        self.inner.lock().unwrap().fail_next = times;
    }

    pub fn fetches(&self) -> u32 {
        self.inner.lock().unwrap().fetches
    }
}

#[async_trait]
impl MarketDataPort for ScriptedMarket {
    async fn fetch(
        &self,
        _symbol: &Symbol,
        _interval: &str,
        _lookback: Duration,
    ) -> Result<Vec<Bar>, DataError> {
        let mut script = self.inner.lock().unwrap();
        script.fetches += 1;
        if script.fail_next > 0 {
            script.fail_next -= 1;
            return Err(DataError::Unavailable("scripted outage".to_string()));
        }
        if script.bars.is_empty() {
            return Err(DataError::Unavailable("no bars".to_string()));
        }
        Ok(script.bars.clone())
    }

    async fn last_price(&self, _symbol: &Symbol) -> Result<Decimal, DataError> {
        let script = self.inner.lock().unwrap();
        script
            .price
            .ok_or_else(|| DataError::Unavailable("no quote".to_string()))
    }
}

/// Journal that keeps records in memory and can be told to fail.
#[derive(Default)]
pub struct MemoryJournal {
    trades: Mutex<Vec<ClosedTrade>>,
    failing: Mutex<bool>,
}

impl MemoryJournal {
    pub fn trades(&self) -> Vec<ClosedTrade> {
        self.trades.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl TradeJournal for MemoryJournal {
    async fn record(&self, trade: &ClosedTrade) -> anyhow::Result<()> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("journal disk full");
        }
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Every fake wired into a [`Collaborators`] bundle, with handles kept for assertions.
pub struct Harness {
    pub market: Arc<ScriptedMarket>,
    pub gateway: Arc<ScriptedGateway>,
    pub journal: Arc<MemoryJournal>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            market: Arc::new(ScriptedMarket::new(bars)),
            gateway: Arc::new(ScriptedGateway::new()),
            journal: Arc::new(MemoryJournal::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            market: self.market.clone(),
            gateway: self.gateway.clone(),
            journal: self.journal.clone(),
            notifier: self.notifier.clone(),
        }
    }

    /// Move the quote and the fill price together.
    pub fn price(&self, price: Decimal) {
        self.market.set_price(price);
        self.gateway.fill_at(price);
    }
}
