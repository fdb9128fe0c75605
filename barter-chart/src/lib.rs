//! Barter Chart - streaming candlestick core for live crypto futures charts.
//!
//! The library provides:
//! - [`BarStore`]: ordered, capacity bounded OHLCV series with merge and live tick semantics
//! - [`IndicatorEngine`]: RSI(14) and Bollinger(20, 2) attached to every bar
//! - [`BackfillCoordinator`]: paginated history walk backwards in time
//! - [`LiveUpdatePump`]: fixed cadence polling of the latest bar
//! - [`ChartViewport`]: zoom, visible window, pixel geometry and hover resolution
//! - [`ChartSession`]: per (symbol, interval) lifecycle tying the above together
//!
//! Market data arrives through the [`MarketDataSource`] seam; [`BybitKlineClient`] implements
//! it against the trading backend's kline proxy.

pub mod backfill;
pub mod bar;
pub mod config;
pub mod error;
pub mod indicator;
pub mod interval;
pub mod live;
pub mod session;
pub mod source;
pub mod store;
pub mod viewport;

pub use backfill::{BackfillCoordinator, BackfillReport, BackfillState, BackfillStop};
pub use bar::{Bar, Bollinger, Indicators, SeriesKey};
pub use config::ChartConfig;
pub use error::ChartError;
pub use indicator::{IndicatorEngine, RSI_OVERBOUGHT, RSI_OVERSOLD};
pub use interval::Interval;
pub use live::{LiveStats, LiveUpdatePump};
pub use session::{ChartSession, ChartSnapshot, SharedSeries};
pub use source::{HistoryRequest, KlinePage, MarketDataSource, bybit::BybitKlineClient};
pub use store::{BarStore, MergeOutcome, TickKind};
pub use viewport::{ChartViewport, Hover, ViewportConfig, ViewportLayout};
