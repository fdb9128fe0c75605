use crate::store::DEFAULT_CAPACITY;
use smol_str::SmolStr;
use std::{str::FromStr, time::Duration};

/// Chart session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    /// Base URL of the backend proxying the exchange kline endpoint.
    pub server_url: String,
    /// Exchange product category, eg/ "linear" for USDT perpetuals.
    pub category: SmolStr,
    /// Bars requested per historical page.
    pub page_size: usize,
    /// Maximum number of historical pages walked per session.
    pub page_budget: usize,
    /// Most recent bars retained per series.
    pub capacity: usize,
    /// Live feed polling cadence.
    pub poll_interval: Duration,
    /// Per request timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:4000".to_string(),
            category: SmolStr::new_static("linear"),
            page_size: 200,
            page_budget: 5,
            capacity: DEFAULT_CAPACITY,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ChartConfig {
    /// Create a new configuration with custom server URL
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Build configuration from `CHART_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: std::env::var("CHART_SERVER_URL").unwrap_or(defaults.server_url),
            category: std::env::var("CHART_CATEGORY")
                .map(SmolStr::from)
                .unwrap_or(defaults.category),
            page_size: env_parse("CHART_PAGE_SIZE").unwrap_or(defaults.page_size),
            page_budget: env_parse("CHART_PAGE_BUDGET").unwrap_or(defaults.page_budget),
            capacity: env_parse("CHART_CAPACITY").unwrap_or(defaults.capacity),
            poll_interval: env_parse("CHART_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: env_parse("CHART_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn with_category(mut self, category: impl Into<SmolStr>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_page_budget(mut self, page_budget: usize) -> Self {
        self.page_budget = page_budget;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Parse an environment variable, ignoring it when unset or unparsable.
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
}
