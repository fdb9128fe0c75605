//! Chart intervals and their fixed exchange interval codes.

use crate::error::ChartError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Candle interval of a chart series.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    /// Human readable label, eg/ "1m", "4h".
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    /// Interval code expected by the kline endpoint.
    pub fn code(&self) -> &'static str {
        match self {
            Interval::M1 => "1",
            Interval::M5 => "5",
            Interval::M15 => "15",
            Interval::H1 => "60",
            Interval::H4 => "240",
            Interval::D1 => "D",
        }
    }

    /// Bucket length in milliseconds, used only to compute backward pagination offsets.
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        match self {
            Interval::M1 => MINUTE,
            Interval::M5 => 5 * MINUTE,
            Interval::M15 => 15 * MINUTE,
            Interval::H1 => 60 * MINUTE,
            Interval::H4 => 4 * 60 * MINUTE,
            Interval::D1 => 24 * 60 * MINUTE,
        }
    }

    /// Next interval in [`Interval::ALL`], wrapping around.
    pub fn next(&self) -> Self {
        let index = Self::ALL.iter().position(|i| i == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChartError::UnknownInterval(s.to_string()))
    }
}
