use crate::{
    bar::Bar,
    config::ChartConfig,
    error::ChartError,
    interval::Interval,
    source::{HistoryRequest, KlinePage, KlineRow, MarketDataSource},
};
use async_trait::async_trait;
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::debug;
use url::Url;

/// Path of the kline endpoint exposed by the trading backend.
const KLINES_PATH: &str = "api/klines";

/// [`Bybit`](https://bybit-exchange.github.io/docs/v5/market/kline) v5 kline response envelope,
/// as forwarded unchanged by the trading backend.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BybitKlineResponse {
    #[serde(default)]
    pub result: Option<BybitKlineResult>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BybitKlineResult {
    #[serde(default)]
    pub list: Vec<KlineRow>,
}

impl BybitKlineResponse {
    pub fn into_rows(self) -> Vec<KlineRow> {
        self.result.map(|result| result.list).unwrap_or_default()
    }
}

/// [`MarketDataSource`] polling the backend's Bybit kline proxy over REST.
#[derive(Debug, Clone)]
pub struct BybitKlineClient {
    http: reqwest::Client,
    klines_url: Url,
    category: SmolStr,
}

impl BybitKlineClient {
    pub fn new(config: &ChartConfig) -> Result<Self, ChartError> {
        let base = Url::parse(&config.server_url)?;
        let klines_url = base.join(KLINES_PATH)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ChartError::Config(error.to_string()))?;

        Ok(Self {
            http,
            klines_url,
            category: config.category.clone(),
        })
    }

    pub fn klines_url(&self) -> &Url {
        &self.klines_url
    }

    async fn get_klines(&self, query: &[(&str, String)]) -> Result<Vec<KlineRow>, ChartError> {
        let response = self
            .http
            .get(self.klines_url.clone())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChartError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload = response.json::<BybitKlineResponse>().await?;
        Ok(payload.into_rows())
    }
}

/// Query parameters for a historical page request.
pub fn history_query(request: &HistoryRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("symbol", request.symbol.to_string()),
        ("interval", request.interval.code().to_string()),
        ("limit", request.limit.to_string()),
        ("category", request.category.to_string()),
    ];
    if let Some(start) = request.start_time_ms {
        query.push(("start", start.to_string()));
    }
    query
}

#[async_trait]
impl MarketDataSource for BybitKlineClient {
    async fn fetch_history(&self, request: &HistoryRequest) -> Result<KlinePage, ChartError> {
        let rows = self.get_klines(&history_query(request)).await?;
        debug!(
            symbol = %request.symbol,
            interval = %request.interval,
            start = ?request.start_time_ms,
            rows = rows.len(),
            "fetched kline page"
        );
        Ok(KlinePage::from_rows(rows))
    }

    async fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Bar>, ChartError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.code().to_string()),
            ("limit", "1".to_string()),
            ("category", self.category.to_string()),
        ];

        let rows = self.get_klines(&query).await?;
        rows.into_iter().next().map(Bar::try_from).transpose()
    }
}
