//! Samplers -- one numeric observation per tick from an upstream HTTP API.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod crypto;
pub mod weather;

/// Why a fetch produced no sample. None of these are fatal; the tick is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("response body could not be decoded: {0}")]
    Decode(String),
    #[error("response has no numeric field at {0}")]
    MissingField(String),
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Which upstream API feeds the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Weather,
    Crypto,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Weather => write!(f, "weather"),
            SourceKind::Crypto => write!(f, "crypto"),
        }
    }
}

/// One observed value for an entity, stamped when the response was parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub entity_key: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(entity_key: impl Into<String>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            entity_key: entity_key.into(),
            timestamp,
            value,
        }
    }
}

/// Trait for all upstream samplers
#[async_trait::async_trait]
pub trait Sampler: Send + Sync {
    /// Fetch the current value for `entity_key`.
    async fn fetch(&self, entity_key: &str) -> Result<Sample, FetchError>;

    fn kind(&self) -> SourceKind;
}

/// Build the shared HTTP client. The timeout must be finite: a hung request
/// would stall the whole polling loop.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("pulsewatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(FetchError::Transport)
}

/// GET `url` and decode a JSON body, mapping every failure onto [`FetchError`].
///
/// URLs are stripped from transport errors since they carry API keys.
pub(crate) async fn get_json<Q: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    query: &Q,
) -> Result<Value, FetchError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.without_url()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| FetchError::Decode(e.without_url().to_string()))
}

/// Read the number at JSON `pointer` (RFC 6901) out of `body`.
pub fn extract_value(body: &Value, pointer: &str) -> Result<f64, FetchError> {
    body.pointer(pointer)
        .and_then(Value::as_f64)
        .ok_or_else(|| FetchError::MissingField(pointer.to_string()))
}

/// Escape one JSON pointer reference token.
pub(crate) fn pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
