//! Application configuration.
//!
//! Built-in defaults, then an optional TOML/YAML file, then `TRADELOOP__*`
//! environment overrides (e.g. `TRADELOOP__ENGINE__DRY_RUN=true`). Secrets are
//! read from plain environment variables only and never written to the file.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Symbol;
use crate::trading::{
    EngineConfig, GateConfig, RetryConfig, RiskConfig, SchedulerConfig, SessionConfig,
    StrategyConfig,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/tradeloop";

const ENV_PREFIX: &str = "TRADELOOP";
const API_KEY_VAR: &str = "OPENALGO_API_KEY";
const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_VAR: &str = "TELEGRAM_CHAT_ID";

/// OpenAlgo connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base URL of the OpenAlgo server
    pub host: String,

    /// Strategy tag attached to every order
    pub strategy_tag: String,

    /// Product type (MIS for intraday)
    pub product: String,

    /// Bound on each HTTP request, order placement included
    pub request_timeout_secs: u64,

    /// Budget for reading the fill price once an order is placed
    pub fill_price_timeout_secs: u64,

    /// Retries for history and quote reads; orders are never retried by the client
    pub read_retries: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:5000".to_string(),
            strategy_tag: "tradeloop".to_string(),
            product: "MIS".to_string(),
            request_timeout_secs: 5,
            fill_price_timeout_secs: 3,
            read_retries: 2,
        }
    }
}

/// One traded instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: Symbol,
    pub quantity: u32,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub risk: RiskConfig,
    pub gate: GateConfig,
    pub retry: RetryConfig,
    pub strategy: StrategyConfig,
    pub symbols: Vec<SymbolConfig>,
}

impl AppConfig {
    /// Load configuration. An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_PATH)).required(path.is_some()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("No symbols configured");
        }
        if let Some(s) = self.symbols.iter().find(|s| s.quantity == 0) {
            bail!("Quantity for {} must be positive", s.symbol);
        }
        if self.session.start >= self.session.end {
            bail!(
                "Session start {} must be before end {}",
                self.session.start,
                self.session.end
            );
        }
        let fraction = self.risk.partial.fraction;
        if self.risk.partial.enabled && (fraction <= Decimal::ZERO || fraction >= Decimal::ONE) {
            bail!("Partial fraction must be between 0 and 1, got {}", fraction);
        }
        if self.risk.stop.is_zero() {
            bail!("Stop distance must be positive");
        }
        let order_budget = self.broker.request_timeout_secs + self.broker.fill_price_timeout_secs;
        if self.engine.call_timeout_secs <= order_budget {
            bail!(
                "call_timeout_secs ({}) must exceed request_timeout_secs + fill_price_timeout_secs ({})",
                self.engine.call_timeout_secs,
                order_budget
            );
        }
        if self.gate.max_trades_per_day == 0 {
            bail!("max_trades_per_day must be at least 1");
        }
        if self.engine.poll_interval_secs == 0 || self.engine.monitor_interval_secs == 0 {
            bail!("Poll and monitor intervals must be positive");
        }
        Ok(())
    }

    /// Keep only the given symbols (CLI `--symbol` filter).
    pub fn restrict_symbols(&mut self, only: &[Symbol]) -> Result<()> {
        if only.is_empty() {
            return Ok(());
        }
        if let Some(missing) = only.iter().find(|s| !self.symbols.iter().any(|c| &c.symbol == *s)) {
            bail!("Symbol {} is not configured", missing);
        }
        self.symbols.retain(|c| only.contains(&c.symbol));
        Ok(())
    }

    /// The read-only subset each symbol scheduler shares.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            engine: self.engine.clone(),
            session: self.session.clone(),
            risk: self.risk.clone(),
            gate: self.gate.clone(),
            retry: self.retry.clone(),
        }
    }

    /// One-line digest for logging.
    pub fn digest(&self) -> String {
        format!(
            "host={} symbols={} interval={} dry_run={} window={}-{}",
            self.broker.host,
            self.symbols.len(),
            self.engine.bar_interval,
            self.engine.dry_run,
            self.session.start.format("%H:%M"),
            self.session.end.format("%H:%M"),
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Credentials, from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openalgo_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openalgo_api_key: read(API_KEY_VAR),
            telegram_bot_token: read(TELEGRAM_TOKEN_VAR),
            telegram_chat_id: read(TELEGRAM_CHAT_VAR),
        }
    }

    pub fn api_key(&self) -> Result<String> {
        match &self.openalgo_api_key {
            Some(key) => Ok(key.clone()),
            None => bail!("Required environment variable {} is not set", API_KEY_VAR),
        }
    }

    /// Token and chat id, when both are present.
    pub fn telegram(&self) -> Option<(String, String)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.clone(), chat.clone())),
            _ => None,
        }
    }
}

// Keeps tokens out of `config` output and logs
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openalgo_api_key", &self.openalgo_api_key.as_ref().map(|_| "***"))
            .field("telegram", &self.telegram().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::DistanceRule;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    fn sample() -> AppConfig {
        let mut config = AppConfig::default();
        config.symbols = vec![
            SymbolConfig {
                symbol: Symbol::new("NSE", "SBIN"),
                quantity: 10,
            },
            SymbolConfig {
                symbol: Symbol::new("NSE", "INFY"),
                quantity: 5,
            },
        ];
        config
    }

    #[test]
    fn test_defaults_validate() {
        assert!(sample().validate().is_ok());
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_session() {
        let mut config = sample();
        config.session.start = NaiveTime::from_hms_opt(15, 30, 0).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_full_partial_fraction() {
        let mut config = sample();
        config.risk.partial.fraction = Decimal::ONE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_call_timeout_inside_order_budget() {
        let mut config = sample();
        config.engine.call_timeout_secs = config.broker.request_timeout_secs;
        assert!(config.validate().is_err());

        config.engine.call_timeout_secs =
            config.broker.request_timeout_secs + config.broker.fill_price_timeout_secs + 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_stop() {
        let mut config = sample();
        config.risk.stop = DistanceRule::Points(Decimal::ZERO);
        assert!(config.validate().is_err());

        // An ATR stop can only be checked per signal
        config.risk.stop = DistanceRule::Atr(dec!(1.5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_restrict_symbols() {
        let mut config = sample();
        config.restrict_symbols(&[Symbol::new("NSE", "INFY")]).unwrap();
        assert_eq!(config.symbols.len(), 1);
        assert_eq!(config.symbols[0].quantity, 5);

        assert!(config.restrict_symbols(&[Symbol::new("NSE", "TCS")]).is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let raw = r#"{
            "risk": {"stop": {"kind": "atr", "value": "1.5"}},
            "symbols": [{"symbol": "NSE:RELIANCE", "quantity": 2}]
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.risk.stop, DistanceRule::Atr(dec!(1.5)));
        assert_eq!(config.risk.target, DistanceRule::Percent(dec!(4.0)));
        assert_eq!(config.symbols[0].symbol.ticker(), "RELIANCE");
        assert_eq!(config.broker.product, "MIS");
        assert_eq!(config.scheduler_config().gate.max_trades_per_day, 3);
    }

    #[test]
    fn test_secrets_debug_hides_values() {
        let secrets = Secrets {
            openalgo_api_key: Some("abc123".to_string()),
            ..Secrets::default()
        };
        assert!(!format!("{:?}", secrets).contains("abc123"));
    }
}
