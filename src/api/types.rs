//! Request and response bodies for the OpenAlgo REST API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: &str = "success";

// === Requests ===

/// Body of `/api/v1/history`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest<'a> {
    pub apikey: &'a str,
    pub symbol: &'a str,
    pub exchange: &'a str,
    pub interval: &'a str,
    /// `%Y-%m-%d`
    pub start_date: String,
    pub end_date: String,
}

/// Body of `/api/v1/quotes`.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest<'a> {
    pub apikey: &'a str,
    pub symbol: &'a str,
    pub exchange: &'a str,
}

/// Body of `/api/v1/placeorder`.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest<'a> {
    pub apikey: &'a str,
    pub strategy: &'a str,
    pub symbol: &'a str,
    pub action: &'a str,
    pub exchange: &'a str,
    pub pricetype: &'a str,
    pub product: &'a str,
    /// Sent as a string, which every OpenAlgo version accepts
    pub quantity: String,
}

/// Body of `/api/v1/orderstatus`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusRequest<'a> {
    pub apikey: &'a str,
    pub strategy: &'a str,
    pub orderid: &'a str,
}

// === Responses ===

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Vec<Candle>,
}

/// One OHLCV row. `timestamp` is epoch seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<QuoteData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteData {
    pub ltp: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub orderid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusResponse {
    #[serde(default)]
    pub status: String,
    pub data: Option<OrderStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusData {
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub order_status: String,
}
