use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulsewatch::config::{LoggingConfig, PulsewatchConfig};
use pulsewatch::driver::{backfill, CycleDriver, IntervalTicks, LimitedTicks};
use pulsewatch::present::{ConsolePresenter, Presenter};
use pulsewatch::sampler::crypto::CryptoSampler;
use pulsewatch::sampler::SourceKind;
use pulsewatch::storage::SeriesStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pulsewatch",
    about = "Periodic weather and price sampling with rolling statistics and anomaly flagging",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, env = "PULSEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the upstream API and print insights after every cycle
    Watch {
        /// City query (weather) or asset id (crypto); defaults to sampling.entity
        #[arg(long)]
        entity: Option<String>,

        /// Upstream API to sample
        #[arg(long, value_enum)]
        source: Option<SourceKind>,

        /// Seconds between samples
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many cycles (runs until interrupted otherwise)
        #[arg(long)]
        cycles: Option<usize>,

        /// Table rows shown per cycle
        #[arg(long, default_value = "20")]
        rows: usize,
    },

    /// Start the daemon (cycle driver + dashboard API)
    Serve {
        /// Bind address; defaults to api.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Fetch historical prices for an asset and print insights
    History {
        /// CoinGecko asset id
        #[arg(long, default_value = "bitcoin")]
        asset: String,

        /// Quote currency
        #[arg(long, default_value = "usd")]
        currency: String,

        /// Days of history (30-180)
        #[arg(long, default_value = "60")]
        days: u32,

        /// Also append the fetched points to the store
        #[arg(long)]
        save: bool,

        /// Table rows shown
        #[arg(long, default_value = "20")]
        rows: usize,
    },

    /// Print the stored series and insights for an entity
    Show {
        /// Entity key; defaults to sampling.entity
        #[arg(long)]
        entity: Option<String>,

        /// Table rows shown
        #[arg(long, default_value = "50")]
        rows: usize,
    },

    /// Print the effective configuration
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = PulsewatchConfig::resolve(cli.config.as_deref())?;
    let mut config = resolved.config;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    init_tracing(&config.logging);
    if let Some(e) = &resolved.fallback {
        tracing::warn!(error = %format!("{:#}", e), "System config could not be loaded, using defaults");
    }
    match &resolved.path {
        Some(path) => tracing::info!(path = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No config file found, using compiled-in defaults"),
    }

    match cli.command {
        Commands::Watch {
            entity,
            source,
            interval,
            cycles,
            rows,
        } => {
            let source = source.unwrap_or(config.sampling.source);
            if let Some(secs) = interval {
                config.sampling.interval_secs = secs;
                config.validate()?;
            }
            let entity = match entity {
                Some(entity) => entity,
                None => config
                    .default_entity(source)
                    .map(str::to_string)
                    .with_context(|| format!("No {} entities configured; pass --entity", source))?,
            };
            tracing::info!(%entity, %source, ?cycles, "Starting watch");

            let mut driver = CycleDriver::new(
                pulsewatch::build_sampler(source, &config)?,
                pulsewatch::open_store(&config)?,
                ConsolePresenter::stdout(rows),
                entity,
            )
            .enforce_monotonic(config.sampling.enforce_monotonic);

            let ticks = IntervalTicks::new(config.sampling.interval());
            let mut ticks = LimitedTicks::new(ticks, cycles.unwrap_or(usize::MAX));

            tokio::select! {
                presented = driver.run(&mut ticks) => {
                    tracing::info!(presented, "Watch finished");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                }
            }
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            tracing::info!(%bind, "Starting pulsewatch daemon");
            pulsewatch::serve(&config, &bind).await?;
        }
        Commands::History {
            asset,
            currency,
            days,
            save,
            rows,
        } => {
            let currency = config.crypto.check_currency(&currency)?;
            tracing::info!(%asset, %currency, days, "Fetching price history");
            let sampler = CryptoSampler::new(&config.crypto, config.sampling.http_timeout())?
                .with_currency(&currency);
            let series = sampler
                .fetch_range(&asset, days)
                .await
                .with_context(|| format!("Failed to fetch history for {}", asset))?;

            if save {
                let store = pulsewatch::open_store(&config)?;
                let report = backfill(store.as_ref(), &series, config.sampling.enforce_monotonic)?;
                println!(
                    "Saved {} points for {} ({} not newer than the stored series were skipped).",
                    report.saved, asset, report.skipped
                );
            }

            let insight = pulsewatch::insight::compute(&series);
            let label = format!("{} ({})", asset, sampler.currency().to_uppercase());
            ConsolePresenter::stdout(rows).present(&label, &series, &insight)?;
        }
        Commands::Show { entity, rows } => {
            let entity = entity.unwrap_or_else(|| config.sampling.entity.clone());
            let store = pulsewatch::open_store(&config)?;
            let series = store.read_all(&entity)?;
            let insight = pulsewatch::insight::compute(&series);
            ConsolePresenter::stdout(rows).present(&entity, &series, &insight)?;
        }
        Commands::Config => {
            let text = toml::to_string_pretty(&config.redacted())?;
            println!("{}", text);
        }
    }

    Ok(())
}
