//! TOML configuration for pulsewatch.
//!
//! Layered model: compiled-in defaults, overridden by a config file located via
//! `--config`, `PULSEWATCH_CONFIG`, or the standard system path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::sampler::SourceKind;
use crate::storage::StorageBackend;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PULSEWATCH_CONFIG";

/// Environment variable supplying the OpenWeatherMap key when the file has none.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

const SYSTEM_CONFIG_PATH: &str = "/etc/pulsewatch/pulsewatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulsewatchConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Effective configuration plus where it came from.
#[derive(Debug)]
pub struct Resolved {
    pub config: PulsewatchConfig,
    /// File the config was read from; `None` means compiled-in defaults.
    pub path: Option<PathBuf>,
    /// Set when the system config file exists but could not be loaded and
    /// defaults were used instead. Callers log it once tracing is up.
    pub fallback: Option<anyhow::Error>,
}

impl PulsewatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path (from `--config` or `PULSEWATCH_CONFIG`) must load.
    /// Otherwise the system path is tried, then compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Resolved> {
        Self::resolve_from(explicit, Path::new(SYSTEM_CONFIG_PATH))
    }

    fn resolve_from(explicit: Option<&Path>, system_path: &Path) -> Result<Resolved> {
        let mut resolved = match explicit {
            Some(path) => Resolved {
                config: Self::load(path)?,
                path: Some(path.to_path_buf()),
                fallback: None,
            },
            None => Self::load_or_default(system_path),
        };
        resolved.config.apply_env();
        resolved.config.validate()?;
        Ok(resolved)
    }

    /// Try `system_path`, falling back to defaults. A file that exists but
    /// fails to load is returned as the fallback error.
    fn load_or_default(system_path: &Path) -> Resolved {
        if !system_path.exists() {
            return Resolved {
                config: Self::default(),
                path: None,
                fallback: None,
            };
        }
        match Self::load(system_path) {
            Ok(config) => Resolved {
                config,
                path: Some(system_path.to_path_buf()),
                fallback: None,
            },
            Err(e) => Resolved {
                config: Self::default(),
                path: None,
                fallback: Some(e),
            },
        }
    }

    fn apply_env(&mut self) {
        if self.weather.api_key.is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.weather.api_key = key;
            }
        }
    }

    /// Reject settings that would stall or spin the polling loop.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.interval_secs == 0 {
            bail!("sampling.interval_secs must be at least 1");
        }
        if self.sampling.http_timeout_secs == 0 {
            bail!("sampling.http_timeout_secs must be at least 1");
        }
        if self.sampling.entity.trim().is_empty() {
            bail!("sampling.entity must not be empty");
        }
        let source = self.sampling.source;
        let known = self.entities(source);
        if !known.is_empty() && !known.iter().any(|e| e == &self.sampling.entity) {
            bail!(
                "sampling.entity '{}' is not one of the configured {} entities ({})",
                self.sampling.entity,
                source,
                known.join(", ")
            );
        }
        self.crypto.check_currency(&self.crypto.currency)?;
        Ok(())
    }

    /// Entity to sample when `source` is used without an explicit entity:
    /// `sampling.entity` for the configured source, else the first entity
    /// listed for `source`.
    pub fn default_entity(&self, source: SourceKind) -> Option<&str> {
        if source == self.sampling.source {
            return Some(self.sampling.entity.as_str());
        }
        self.entities(source).first().map(String::as_str)
    }

    /// Entity keys selectable for the configured source.
    pub fn entities(&self, source: SourceKind) -> &[String] {
        match source {
            SourceKind::Weather => &self.weather.cities,
            SourceKind::Crypto => &self.crypto.assets,
        }
    }

    /// Copy suitable for display, with secrets masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.weather.api_key.is_empty() {
            copy.weather.api_key = "********".to_string();
        }
        copy
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Polling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Upstream API feeding the series.
    pub source: SourceKind,
    /// Entity sampled at startup (city query or asset id).
    pub entity: String,
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// Upper bound on a single upstream request.
    pub http_timeout_secs: u64,
    /// Reject samples timestamped before the last stored sample.
    pub enforce_monotonic: bool,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Weather,
            entity: "Hyderabad,IN".to_string(),
            interval_secs: 10,
            http_timeout_secs: 10,
            enforce_monotonic: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream APIs
// ---------------------------------------------------------------------------

/// OpenWeatherMap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: String,
    /// `metric`, `imperial` or `standard`.
    pub units: String,
    pub cities: Vec<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.openweathermap.org".to_string(),
            api_key: String::new(),
            units: "metric".to_string(),
            cities: ["Hyderabad,IN", "Mumbai,IN", "Delhi,IN", "Bengaluru,IN", "Chennai,IN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// CoinGecko settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub base_url: String,
    /// Quote currency for live sampling.
    pub currency: String,
    pub assets: Vec<String>,
    pub currencies: Vec<String>,
}

impl CryptoConfig {
    /// Normalize `currency` and check it against `currencies` (an empty list
    /// accepts anything).
    pub fn check_currency(&self, currency: &str) -> Result<String> {
        let currency = currency.trim().to_lowercase();
        let listed = self.currencies.iter().any(|c| c.eq_ignore_ascii_case(&currency));
        if !self.currencies.is_empty() && !listed {
            bail!(
                "unsupported currency '{}' (expected one of: {})",
                currency,
                self.currencies.join(", ")
            );
        }
        Ok(currency)
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com".to_string(),
            currency: "usd".to_string(),
            assets: ["bitcoin", "ethereum", "litecoin", "dogecoin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            currencies: ["usd", "eur", "gbp"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage / API / Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            db_path: PathBuf::from("data/pulsewatch.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
