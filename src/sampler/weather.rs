use super::{build_client, extract_value, get_json, FetchError, Sample, Sampler, SourceKind};
use crate::config::WeatherConfig;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const TEMPERATURE_POINTER: &str = "/main/temp";

/// OpenWeatherMap current-conditions sampler. Entity keys are city queries
/// such as `Hyderabad,IN`; the value is `main.temp`.
pub struct WeatherSampler {
    client: Client,
    base_url: String,
    api_key: String,
    units: String,
}

impl WeatherSampler {
    pub fn new(config: &WeatherConfig, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            units: config.units.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Sampler for WeatherSampler {
    async fn fetch(&self, entity_key: &str) -> Result<Sample, FetchError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let query = [
            ("q", entity_key),
            ("appid", self.api_key.as_str()),
            ("units", self.units.as_str()),
        ];

        let body = get_json(&self.client, &url, &query).await?;
        let value = extract_value(&body, TEMPERATURE_POINTER)?;

        Ok(Sample::new(entity_key, Utc::now(), value))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Weather
    }
}
