//! Trading engine: risk state, position lifecycle, gating and the per-symbol scheduler.

mod config;
mod gate;
mod ports;
mod position;
mod retry;
mod risk;
mod scheduler;
mod strategy;

pub use config::{
    DistanceRule, EngineConfig, GateConfig, PartialConfig, ProfitableException, RetryConfig,
    RiskConfig, SchedulerConfig, SessionConfig, StagnationConfig,
};
pub use gate::{DailyGate, GateBlock};
pub use ports::{Collaborators, MarketDataPort, Notifier, OrderGateway, TradeJournal};
pub use position::{EntryAttempt, Phase, PositionStateMachine, TickOutcome};
pub use retry::EntryRetry;
pub use risk::{RiskLevels, RiskState, TrailUpdate};
pub use scheduler::{SymbolReport, SymbolScheduler, WindowPhase};
pub use strategy::{
    build_evaluator, EmaTrend, EmaTrendParams, OpeningRange, OpeningRangeParams, SignalEvaluator,
    StrategyConfig,
};
