use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `barter-chart`.
///
/// Payloads are stringified so the error stays `Clone` and comparable, and can be carried
/// inside chart snapshots handed to the rendering layer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum ChartError {
    #[error("market data fetch failed: {0}")]
    Fetch(String),

    #[error("market data source replied with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed bar dropped: {0}")]
    MalformedBar(String),

    #[error("unknown chart interval: {0}")]
    UnknownInterval(String),

    #[error("invalid chart configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ChartError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::MalformedBar(value.to_string())
        } else {
            Self::Fetch(value.to_string())
        }
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedBar(value.to_string())
    }
}

impl From<url::ParseError> for ChartError {
    fn from(value: url::ParseError) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_json_error_maps_to_malformed_bar() {
        let error = serde_json::from_str::<f64>("\"abc\"").unwrap_err();
        assert!(matches!(ChartError::from(error), ChartError::MalformedBar(_)));
    }
}
