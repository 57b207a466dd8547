use super::{
    build_client, extract_value, get_json, pointer_token, FetchError, Sample, Sampler, SourceKind,
};
use crate::config::CryptoConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

/// Shortest and longest history window accepted by `fetch_range`, in days.
pub const MIN_HISTORY_DAYS: u32 = 30;
pub const MAX_HISTORY_DAYS: u32 = 180;

/// CoinGecko price sampler. Entity keys are CoinGecko asset ids (`bitcoin`,
/// `ethereum`, ...) quoted in a single currency.
pub struct CryptoSampler {
    client: Client,
    base_url: String,
    currency: String,
}

impl CryptoSampler {
    pub fn new(config: &CryptoConfig, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            currency: config.currency.to_lowercase(),
        })
    }

    /// Quote prices in `currency` instead of the configured one.
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_lowercase();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Fetch the price history of `asset` over the last `days` days.
    ///
    /// `days` is clamped to [`MIN_HISTORY_DAYS`]..=[`MAX_HISTORY_DAYS`].
    pub async fn fetch_range(&self, asset: &str, days: u32) -> Result<Vec<Sample>, FetchError> {
        let days = clamp_days(days);
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(days));

        let url = self.range_url(asset)?;
        let query = [
            ("vs_currency", self.currency.clone()),
            ("from", start.timestamp().to_string()),
            ("to", end.timestamp().to_string()),
        ];

        let body = get_json(&self.client, url.as_str(), &query).await?;
        let samples = parse_price_history(asset, &body)?;
        tracing::debug!(asset, days, points = samples.len(), "Fetched price history");
        Ok(samples)
    }

    /// `{base}/api/v3/coins/{asset}/market_chart/range`, with `asset` escaped
    /// as a single path segment.
    fn range_url(&self, asset: &str) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v3", "coins"])
            .push(asset)
            .extend(["market_chart", "range"]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Sampler for CryptoSampler {
    async fn fetch(&self, entity_key: &str) -> Result<Sample, FetchError> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let query = [("ids", entity_key), ("vs_currencies", self.currency.as_str())];

        let body = get_json(&self.client, &url, &query).await?;
        let pointer = format!("/{}/{}", pointer_token(entity_key), pointer_token(&self.currency));
        let value = extract_value(&body, &pointer)?;

        Ok(Sample::new(entity_key, Utc::now(), value))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Crypto
    }
}

pub fn clamp_days(days: u32) -> u32 {
    days.clamp(MIN_HISTORY_DAYS, MAX_HISTORY_DAYS)
}

/// Turn a `market_chart/range` body (`{"prices": [[ms, price], ...]}`) into samples.
pub fn parse_price_history(asset: &str, body: &Value) -> Result<Vec<Sample>, FetchError> {
    let prices = body
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MissingField("/prices".to_string()))?;

    prices
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let point = entry.as_array().filter(|p| p.len() >= 2);
            let millis = point.and_then(|p| p[0].as_f64());
            let price = point.and_then(|p| p[1].as_f64());
            match (millis, price) {
                (Some(ms), Some(price)) => {
                    let timestamp = DateTime::from_timestamp_millis(ms as i64).ok_or_else(|| {
                        FetchError::Decode(format!("prices[{}] has out-of-range timestamp {}", i, ms))
                    })?;
                    Ok(Sample::new(asset, timestamp, price))
                }
                _ => Err(FetchError::Decode(format!(
                    "prices[{}] is not a [timestamp, price] pair",
                    i
                ))),
            }
        })
        .collect()
}
