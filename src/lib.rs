//! pulsewatch -- periodic sampling of weather and price APIs with rolling
//! statistics and anomaly flagging.
//!
//! A [`driver::CycleDriver`] pulls one sample per tick from a
//! [`sampler::Sampler`], appends it to a [`storage::SeriesStore`], recomputes
//! the [`insight::Insight`] over the full history and hands both to a
//! [`present::Presenter`].

pub mod api;
pub mod config;
pub mod driver;
pub mod insight;
pub mod present;
pub mod sampler;
pub mod storage;

use anyhow::{Context, Result};
use config::PulsewatchConfig;
use driver::{CycleDriver, IntervalTicks};
use sampler::{crypto::CryptoSampler, weather::WeatherSampler, Sampler, SourceKind};
use std::sync::Arc;
use storage::{MemoryStore, SeriesStore, SqliteStore, StorageBackend};

/// Build the sampler for `source` from configuration.
pub fn build_sampler(source: SourceKind, config: &PulsewatchConfig) -> Result<Box<dyn Sampler>> {
    let timeout = config.sampling.http_timeout();
    let sampler: Box<dyn Sampler> = match source {
        SourceKind::Weather => {
            if config.weather.api_key.is_empty() {
                tracing::warn!(
                    "No OpenWeatherMap API key configured (set weather.api_key or {})",
                    config::API_KEY_ENV
                );
            }
            Box::new(WeatherSampler::new(&config.weather, timeout)?)
        }
        SourceKind::Crypto => Box::new(CryptoSampler::new(&config.crypto, timeout)?),
    };
    Ok(sampler)
}

/// Open the configured series store.
pub fn open_store(config: &PulsewatchConfig) -> Result<Arc<dyn SeriesStore>> {
    let store: Arc<dyn SeriesStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::open(&config.storage.db_path).context("Failed to open sample database")?,
        ),
        StorageBackend::Memory => {
            tracing::info!("Using in-memory store; history is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

/// Start the daemon: cycle driver in the background, dashboard API in front.
pub async fn serve(config: &PulsewatchConfig, bind: &str) -> Result<()> {
    let source = config.sampling.source;

    // 1. Initialize Storage
    let store = open_store(config)?;

    // 2. Initialize the driver, publishing into the shared dashboard view
    let view = present::DashboardView::new();
    let (selection_tx, selection_rx) =
        tokio::sync::watch::channel(config.sampling.entity.clone());
    let mut driver = CycleDriver::new(
        build_sampler(source, config)?,
        store.clone(),
        present::DashboardPresenter::new(view.clone()),
        config.sampling.entity.clone(),
    )
    .enforce_monotonic(config.sampling.enforce_monotonic)
    .with_selection(selection_rx);

    // 3. Start the cycle driver (background task)
    let interval = config.sampling.interval();
    tokio::spawn(async move {
        let mut ticks = IntervalTicks::new(interval);
        driver.run(&mut ticks).await;
    });

    // 4. Start API Server
    let state = api::state::AppState {
        store,
        view,
        selection: Arc::new(selection_tx),
        entities: Arc::new(config.entities(source).to_vec()),
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;
    tracing::info!(%addr, %source, "pulsewatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("pulsewatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
