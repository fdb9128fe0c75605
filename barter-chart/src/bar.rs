use crate::{error::ChartError, interval::Interval};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Epoch values below this are reported in seconds rather than milliseconds.
pub const EPOCH_MS_THRESHOLD: i64 = 1_000_000_000_000;

/// Identifies the single series a chart session owns.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display, Constructor)]
#[display("{symbol}@{interval}")]
pub struct SeriesKey {
    pub symbol: SmolStr,
    pub interval: Interval,
}

/// Bollinger Band envelope attached to a [`Bar`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Indicator values derived by the [`IndicatorEngine`](crate::indicator::IndicatorEngine).
///
/// Never populated by a market data source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Indicators {
    pub rsi: Option<f64>,
    pub bollinger: Option<Bollinger>,
}

/// One OHLCV sample for a fixed time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    /// Bucket start, milliseconds since epoch. Unique key within a series.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    #[serde(default)]
    pub indicators: Indicators,
}

impl Bar {
    /// Construct a validated [`Bar`] with no indicator values attached.
    pub fn try_new(
        time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Result<Self, ChartError> {
        let bar = Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            indicators: Indicators::default(),
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Check the OHLC invariants: finite prices with `low <= open, close <= high`.
    pub fn validate(&self) -> Result<(), ChartError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|price| !price.is_finite()) {
            return Err(ChartError::MalformedBar(format!(
                "non-finite price at time {}",
                self.time
            )));
        }

        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(ChartError::MalformedBar(format!(
                "inconsistent OHLC at time {}: o={} h={} l={} c={}",
                self.time, self.open, self.high, self.low, self.close
            )));
        }

        match self.volume {
            Some(volume) if !volume.is_finite() || volume < 0.0 => Err(ChartError::MalformedBar(
                format!("invalid volume {} at time {}", volume, self.time),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }

    /// Same OHLCV sample with indicator values cleared.
    pub fn without_indicators(self) -> Self {
        Self {
            indicators: Indicators::default(),
            ..self
        }
    }
}

/// Normalise an epoch timestamp that may be reported in seconds to milliseconds.
pub fn normalise_epoch_ms(time: i64) -> i64 {
    if time < EPOCH_MS_THRESHOLD {
        time.saturating_mul(1000)
    } else {
        time
    }
}
