//! OpenAlgo REST client: history, quotes and market order placement.

use std::future::Future;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::{DataError, GatewayError};
use crate::models::{Bar, Fill, OrderIntent, Symbol};
use crate::trading::{MarketDataPort, OrderGateway};

use super::types::*;

const READ_INITIAL_BACKOFF: StdDuration = StdDuration::from_millis(500);
const READ_MAX_BACKOFF: StdDuration = StdDuration::from_secs(4);

/// Client for a local OpenAlgo server. Serves both market data and order placement.
pub struct OpenAlgoClient {
    client: Client,
    base_url: String,
    api_key: String,
    strategy_tag: String,
    product: String,
    read_retries: u32,
    fill_price_budget: StdDuration,
}

impl OpenAlgoClient {
    pub fn new(config: &BrokerConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.host.trim_end_matches('/').to_string(),
            api_key,
            strategy_tag: config.strategy_tag.clone(),
            product: config.product.clone(),
            read_retries: config.read_retries,
            fill_price_budget: StdDuration::from_secs(config.fill_price_timeout_secs),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, endpoint)
    }

    /// POST a JSON body and decode the JSON reply. HTTP errors become `Unavailable`.
    async fn post_read<B, R>(&self, endpoint: &str, body: &B) -> Result<R, DataError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(endpoint);
        debug!(url = %url, "OpenAlgo request");

        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Unavailable(format!("{} returned {}: {}", endpoint, status, body)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| DataError::Malformed(format!("{}: {}", endpoint, e)))
    }

    /// Run an idempotent read, retrying transient failures with exponential backoff.
    async fn with_read_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, DataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(READ_INITIAL_BACKOFF)
            .with_max_interval(READ_MAX_BACKOFF)
            .with_max_elapsed_time(None)
            .build();
        let max_retries = self.read_retries;
        let mut attempt = 0u32;

        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_retryable() && current <= max_retries => {
                        warn!(what, attempt = current, error = %e, "Read failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    async fn fetch_history(
        &self,
        symbol: &Symbol,
        interval: &str,
        lookback: Duration,
    ) -> Result<Vec<Bar>, DataError> {
        let now = Utc::now();
        let since = now - lookback;
        let body = HistoryRequest {
            apikey: &self.api_key,
            symbol: symbol.ticker(),
            exchange: symbol.exchange(),
            interval,
            start_date: since.format("%Y-%m-%d").to_string(),
            end_date: now.format("%Y-%m-%d").to_string(),
        };

        let response: HistoryResponse = self.post_read("history", &body).await?;
        if response.status != STATUS_SUCCESS {
            return Err(DataError::Unavailable(
                response.message.unwrap_or_else(|| format!("history status '{}'", response.status)),
            ));
        }

        let mut bars = response
            .data
            .into_iter()
            .map(candle_to_bar)
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        bars.retain(|b| b.timestamp >= since);

        if bars.is_empty() {
            return Err(DataError::Unavailable(format!("no bars for {}", symbol)));
        }
        Ok(bars)
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Decimal, DataError> {
        let body = QuoteRequest {
            apikey: &self.api_key,
            symbol: symbol.ticker(),
            exchange: symbol.exchange(),
        };

        let response: QuoteResponse = self.post_read("quotes", &body).await?;
        match response.data {
            Some(data) if response.status == STATUS_SUCCESS && data.ltp > Decimal::ZERO => Ok(data.ltp),
            Some(_) if response.status == STATUS_SUCCESS => {
                Err(DataError::Malformed(format!("non-positive ltp for {}", symbol)))
            }
            _ => Err(DataError::Unavailable(
                response.message.unwrap_or_else(|| format!("quote status '{}'", response.status)),
            )),
        }
    }

    /// Best available price for a placed order: broker average, then LTP.
    async fn resolve_fill_price(&self, order_id: &str, symbol: &Symbol) -> Option<Decimal> {
        if let Some(price) = self.average_price(order_id).await {
            return Some(price);
        }
        match self.fetch_quote(symbol).await {
            Ok(ltp) => Some(ltp),
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "Quote for fill price unavailable");
                None
            }
        }
    }

    /// Average fill price reported by the broker, if any.
    async fn average_price(&self, order_id: &str) -> Option<Decimal> {
        let body = OrderStatusRequest {
            apikey: &self.api_key,
            strategy: &self.strategy_tag,
            orderid: order_id,
        };

        match self.post_read::<_, OrderStatusResponse>("orderstatus", &body).await {
            Ok(response) if response.status == STATUS_SUCCESS => {
                let data = response.data?;
                debug!(order_id, status = %data.order_status, price = %data.average_price, "Order status");
                Some(data.average_price).filter(|p| *p > Decimal::ZERO)
            }
            Ok(_) => None,
            Err(e) => {
                debug!(order_id, error = %e, "Order status unavailable");
                None
            }
        }
    }
}

fn candle_to_bar(candle: Candle) -> Result<Bar, DataError> {
    let timestamp = Utc
        .timestamp_opt(candle.timestamp, 0)
        .single()
        .ok_or_else(|| DataError::Malformed(format!("bad timestamp {}", candle.timestamp)))?;

    Ok(Bar {
        timestamp,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
    })
}

#[async_trait]
impl MarketDataPort for OpenAlgoClient {
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: &str,
        lookback: Duration,
    ) -> Result<Vec<Bar>, DataError> {
        self.with_read_retry("history", || self.fetch_history(symbol, interval, lookback))
            .await
    }

    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal, DataError> {
        self.with_read_retry("quotes", || self.fetch_quote(symbol)).await
    }
}

#[async_trait]
impl OrderGateway for OpenAlgoClient {
    /// Place a market order once. Never retried here; the caller owns retry policy.
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, GatewayError> {
        let body = PlaceOrderRequest {
            apikey: &self.api_key,
            strategy: &self.strategy_tag,
            symbol: intent.symbol.ticker(),
            action: intent.action.as_str(),
            exchange: intent.symbol.exchange(),
            pricetype: "MARKET",
            product: &self.product,
            quantity: intent.quantity.to_string(),
        };

        debug!(
            symbol = %intent.symbol,
            action = intent.action.as_str(),
            quantity = intent.quantity,
            "Placing order"
        );

        let response = self.client.post(self.url("placeorder")).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("placeorder returned {}: {}", status, body)));
        }

        let placed: PlaceOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("placeorder decode: {}", e)))?;

        let order_id = match (placed.status.as_str(), placed.orderid) {
            (STATUS_SUCCESS, Some(id)) => id,
            (_, _) => {
                return Err(GatewayError::Rejected(
                    placed.message.unwrap_or_else(|| format!("placeorder status '{}'", placed.status)),
                ))
            }
        };

        // The order is live from here on. Price lookups run on their own budget
        // and a missing price must not turn into an error.
        let lookup = self.resolve_fill_price(&order_id, &intent.symbol);
        let fill_price = match tokio::time::timeout(self.fill_price_budget, lookup).await {
            Ok(Some(price)) => price,
            Ok(None) | Err(_) => {
                warn!(
                    symbol = %intent.symbol,
                    order_id = %order_id,
                    "No fill price available, using reference price"
                );
                intent.reference_price
            }
        };

        Ok(Fill {
            order_id,
            fill_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, IntentPurpose, OrderAction, Signal};
    use crate::trading::{EntryAttempt, PositionStateMachine, RiskConfig};
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const PLACED: &str = r#"{"status": "success", "orderid": "250602000123"}"#;

    /// Read one HTTP request (headers plus content-length body) and return its request line.
    async fn read_request(socket: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return head.lines().next().map(str::to_string);
            }
        }
    }

    /// Local broker that accepts `placeorder` and never answers anything else.
    async fn broker_with_stalled_lookups() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Some(line) = read_request(&mut socket).await else {
                        return;
                    };
                    if line.starts_with("POST /api/v1/placeorder") {
                        let response = format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            PLACED.len(),
                            PLACED
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    } else {
                        tokio::time::sleep(StdDuration::from_secs(60)).await;
                    }
                });
            }
        });

        format!("http://{}", addr)
    }

    fn stalled_client(host: String) -> OpenAlgoClient {
        let config = BrokerConfig {
            host,
            request_timeout_secs: 2,
            fill_price_timeout_secs: 1,
            read_retries: 0,
            ..BrokerConfig::default()
        };
        OpenAlgoClient::new(&config, "test-key".to_string()).unwrap()
    }

    fn client(read_retries: u32) -> OpenAlgoClient {
        let config = BrokerConfig {
            // Nothing listens on port 9; connections are refused immediately
            host: "http://127.0.0.1:9/".to_string(),
            request_timeout_secs: 1,
            read_retries,
            ..BrokerConfig::default()
        };
        OpenAlgoClient::new(&config, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        assert_eq!(client(0).url("quotes"), "http://127.0.0.1:9/api/v1/quotes");
    }

    #[test]
    fn test_candle_to_bar() {
        let bar = candle_to_bar(Candle {
            timestamp: 1_748_836_800,
            open: dec!(812.5),
            high: dec!(815),
            low: dec!(810),
            close: dec!(814),
            volume: dec!(1200),
        })
        .unwrap();
        assert_eq!(bar.timestamp.timestamp(), 1_748_836_800);
        assert!(bar.is_well_formed());
    }

    #[tokio::test]
    async fn test_read_retry_gives_up_after_budget() {
        let c = client(2);
        let mut calls = 0;
        let result: Result<(), DataError> = c
            .with_read_retry("test", || {
                calls += 1;
                async { Err(DataError::Timeout) }
            })
            .await;
        assert!(matches!(result, Err(DataError::Timeout)));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_read_retry_stops_on_malformed() {
        let c = client(5);
        let mut calls = 0;
        let result: Result<(), DataError> = c
            .with_read_retry("test", || {
                calls += 1;
                async { Err(DataError::Malformed("bad json".to_string())) }
            })
            .await;
        assert!(matches!(result, Err(DataError::Malformed(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_placed_order_fills_at_reference_when_lookups_stall() {
        let client = stalled_client(broker_with_stalled_lookups().await);
        let intent = OrderIntent::market(
            Symbol::new("NSE", "SBIN"),
            OrderAction::Buy,
            10,
            IntentPurpose::Entry,
            dec!(812.40),
        );

        let started = std::time::Instant::now();
        let fill = tokio_test::assert_ok!(client.submit(&intent).await);
        assert_eq!(fill.order_id, "250602000123");
        assert_eq!(fill.fill_price, dec!(812.40));
        assert!(started.elapsed() < StdDuration::from_secs(2));
    }

    #[tokio::test]
    async fn test_entry_opens_when_order_status_stalls() {
        let client = stalled_client(broker_with_stalled_lookups().await);
        let mut machine = PositionStateMachine::new(
            Symbol::new("NSE", "SBIN"),
            RiskConfig::default(),
            StdDuration::from_secs(4),
        );
        let signal = Signal {
            direction: Direction::Long,
            reference_price: dec!(812.40),
            risk_distance: dec!(3),
            evaluated_at: Utc::now(),
        };

        let attempt = machine.try_enter(&client, &signal, 10, Utc::now()).await;

        assert!(matches!(attempt, EntryAttempt::Opened(ref f) if f.order_id == "250602000123"));
        assert_eq!(machine.risk_state().unwrap().entry_price(), dec!(812.40));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_a_transport_failure() {
        let intent = OrderIntent::market(
            Symbol::new("NSE", "SBIN"),
            OrderAction::Buy,
            1,
            IntentPurpose::Entry,
            dec!(800),
        );
        let result = client(0).submit(&intent).await;
        assert!(matches!(result, Err(GatewayError::Transport(_)) | Err(GatewayError::Timeout)));
    }
}
