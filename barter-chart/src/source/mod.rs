//! Market Data Source seam.
//!
//! The chart core only consumes bar tuples from a collaborator able to return historical pages
//! and the latest bar of a series. Retries and rate limiting belong to implementations.

use crate::{bar::Bar, error::ChartError, interval::Interval};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::warn;

pub mod bybit;

/// Request for one page of historical bars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: SmolStr,
    pub interval: Interval,
    pub limit: usize,
    pub category: SmolStr,
    /// Oldest bar time requested. `None` asks for the most recent page.
    pub start_time_ms: Option<i64>,
}

/// Decoded page of bars. Rows that failed to decode were dropped and counted.
///
/// `rows` and `earliest_start_ms` describe what the feed sent before validation, so a page
/// whose rows were all malformed is still distinguishable from an exhausted history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KlinePage {
    pub bars: Vec<Bar>,
    pub malformed: usize,
    /// Rows received from the feed, valid or not.
    pub rows: usize,
    /// Earliest start time reported by any row, valid or not.
    pub earliest_start_ms: Option<i64>,
}

impl KlinePage {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            rows: bars.len(),
            earliest_start_ms: bars.iter().map(|bar| bar.time).min(),
            bars,
            malformed: 0,
        }
    }

    /// Decode wire rows, dropping (and logging) any [`ChartError::MalformedBar`].
    pub fn from_rows(rows: impl IntoIterator<Item = KlineRow>) -> Self {
        let mut page = Self::default();
        for row in rows {
            page.rows += 1;
            if let Some(start) = row.start_ms() {
                page.earliest_start_ms = Some(
                    page.earliest_start_ms
                        .map_or(start, |earliest| earliest.min(start)),
                );
            }

            match Bar::try_from(row) {
                Ok(bar) => page.bars.push(bar),
                Err(error) => {
                    warn!(%error, "dropping malformed kline row");
                    page.malformed += 1;
                }
            }
        }
        page
    }

    /// True when the feed sent no rows at all, which marks the end of its history.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// External collaborator providing historical pages and latest bars.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch one page of historical bars, ascending or descending.
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<KlinePage, ChartError>;

    /// Fetch the most recent (possibly still open) bar of a series.
    async fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Bar>, ChartError>;
}

#[async_trait]
impl<T> MarketDataSource for Arc<T>
where
    T: MarketDataSource + ?Sized,
{
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<KlinePage, ChartError> {
        (**self).fetch_history(request).await
    }

    async fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Bar>, ChartError> {
        (**self).fetch_latest(symbol, interval).await
    }
}

/// One kline row as reported by the feed.
///
/// History pages use `[start, open, high, low, close, volume, ...]` arrays, the latest bar may
/// arrive as an object. Numeric fields may be strings or numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KlineRow {
    Tuple(Vec<Value>),
    Object(KlineObject),
}

/// Object shaped kline row.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct KlineObject {
    #[serde(default, alias = "time", alias = "startTime", deserialize_with = "de_opt_num")]
    pub start: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_num")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_num")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_num")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_num")]
    pub close: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_num")]
    pub volume: Option<f64>,
}

impl KlineRow {
    /// Start time of the row if it is readable, regardless of the other fields.
    pub fn start_ms(&self) -> Option<i64> {
        let start = match self {
            KlineRow::Tuple(values) => values.first().and_then(value_f64),
            KlineRow::Object(object) => object.start,
        }?;
        (start.is_finite() && start >= 0.0).then_some(start as i64)
    }
}

impl TryFrom<KlineRow> for Bar {
    type Error = ChartError;

    fn try_from(row: KlineRow) -> Result<Self, Self::Error> {
        let fields = match row {
            KlineRow::Tuple(values) => {
                let field = |index: usize| values.get(index).and_then(value_f64);
                [field(0), field(1), field(2), field(3), field(4), field(5)]
            }
            KlineRow::Object(object) => [
                object.start,
                object.open,
                object.high,
                object.low,
                object.close,
                object.volume,
            ],
        };

        let [Some(time), Some(open), Some(high), Some(low), Some(close), volume] = fields else {
            return Err(ChartError::MalformedBar(format!(
                "kline row missing required fields: {fields:?}"
            )));
        };

        if !time.is_finite() || time < 0.0 {
            return Err(ChartError::MalformedBar(format!("invalid kline start {time}")));
        }

        Bar::try_new(time as i64, open, high, low, close, volume)
    }
}

/// Interpret a JSON number or numeric string as `f64`.
pub fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) if !raw.trim().is_empty() => raw.trim().parse().ok(),
        _ => None,
    }
}

fn de_opt_num<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_f64))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tuple_row_with_string_fields() {
        let row: KlineRow = serde_json::from_str(
            r#"["1700000000000","100.5","101.0","99.5","100.0","12.5","1250.0"]"#,
        )
        .unwrap();

        let bar = Bar::try_from(row).unwrap();
        assert_eq!(bar.time, 1_700_000_000_000);
        assert_eq!(bar.open, 100.5);
        assert_eq!(bar.close, 100.0);
        assert_eq!(bar.volume, Some(12.5));
    }

    #[test]
    fn test_decode_object_row_with_numeric_fields() {
        let row: KlineRow = serde_json::from_str(
            r#"{"start":1700000000,"open":1,"high":2,"low":0.5,"close":1.5,"volume":3}"#,
        )
        .unwrap();

        let bar = Bar::try_from(row).unwrap();
        assert_eq!(bar.time, 1_700_000_000);
        assert_eq!(bar.high, 2.0);
    }

    #[test]
    fn test_decode_rejects_malformed_rows() {
        struct TestCase {
            input: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: missing close
                input: r#"["1700000000000","1","2","0.5"]"#,
            },
            TestCase {
                // TC1: non numeric open
                input: r#"["1700000000000","abc","2","0.5","1"]"#,
            },
            TestCase {
                // TC2: object missing high
                input: r#"{"start":1,"open":1,"low":0.5,"close":1}"#,
            },
            TestCase {
                // TC3: close above high
                input: r#"[1,"1","2","0.5","3"]"#,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let row: KlineRow = serde_json::from_str(test.input).unwrap();
            let actual = Bar::try_from(row);
            assert!(
                matches!(actual, Err(ChartError::MalformedBar(_))),
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_page_from_rows_counts_malformed() {
        let rows: Vec<KlineRow> = serde_json::from_str(
            r#"[["2","1","2","0.5","1.5","1"],["1","1","2","0.5"],["1","1","2","0.5","1","1"]]"#,
        )
        .unwrap();

        let page = KlinePage::from_rows(rows);
        assert_eq!(page.bars.len(), 2);
        assert_eq!(page.malformed, 1);
        assert_eq!(page.rows, 3);
        assert_eq!(page.earliest_start_ms, Some(1));
    }

    #[test]
    fn test_page_of_malformed_rows_is_not_empty() {
        let rows: Vec<KlineRow> = serde_json::from_str(
            r#"[["300","1","2","0.5"],["240","abc","2","0.5","1"],[null,"1","2","0.5","1"]]"#,
        )
        .unwrap();

        let page = KlinePage::from_rows(rows);
        assert!(page.bars.is_empty());
        assert_eq!(page.malformed, 3);
        assert!(!page.is_empty());
        assert_eq!(page.earliest_start_ms, Some(240));

        assert!(KlinePage::from_rows(Vec::new()).is_empty());
    }
}
