//! Cycle driver -- sample, store, analyse and present, once per tick.

pub mod ticks;

use crate::insight::{self, Insight};
use crate::present::Presenter;
use crate::sampler::{FetchError, Sample, Sampler};
use crate::storage::{SeriesStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use self::ticks::{ChannelTicks, IntervalTicks, LimitedTicks, TickSource};

/// Why a cycle ended without presenting a fresh insight.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("sample at {got} is older than the last stored sample at {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// A fresh insight was presented over `entries` samples.
    Presented { entries: usize },
    /// The cycle stopped early; the error was reported to the presenter.
    Skipped(CycleError),
}

impl CycleOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, CycleOutcome::Presented { .. })
    }
}

/// Owns the sampler, a handle to the store and the presenter for one
/// polling loop. The driver is the store's only writer.
pub struct CycleDriver<P: Presenter> {
    sampler: Box<dyn Sampler>,
    store: Arc<dyn SeriesStore>,
    presenter: P,
    active: String,
    enforce_monotonic: bool,
    selection: Option<watch::Receiver<String>>,
}

impl<P: Presenter> CycleDriver<P> {
    pub fn new(
        sampler: Box<dyn Sampler>,
        store: Arc<dyn SeriesStore>,
        presenter: P,
        entity_key: impl Into<String>,
    ) -> Self {
        Self {
            sampler,
            store,
            presenter,
            active: entity_key.into(),
            enforce_monotonic: true,
            selection: None,
        }
    }

    /// Whether to reject samples older than the last stored one.
    pub fn enforce_monotonic(mut self, enforce: bool) -> Self {
        self.enforce_monotonic = enforce;
        self
    }

    /// Follow entity changes published on `selection` (checked once per tick).
    pub fn with_selection(mut self, selection: watch::Receiver<String>) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn active_entity(&self) -> &str {
        &self.active
    }

    pub fn select_entity(&mut self, entity_key: impl Into<String>) {
        let entity_key = entity_key.into();
        if entity_key != self.active {
            info!(from = %self.active, to = %entity_key, "Switching active entity");
            self.active = entity_key;
        }
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Run one cycle per tick until the tick source is exhausted.
    /// Returns the number of cycles that presented a fresh insight.
    pub async fn run<T: TickSource>(&mut self, ticks: &mut T) -> usize {
        info!(entity = %self.active, source = %self.sampler.kind(), "Cycle driver started");

        let mut presented = 0;
        while ticks.next_tick().await.is_some() {
            if self.run_cycle().await.is_presented() {
                presented += 1;
            }
        }

        info!(presented, "Cycle driver stopped");
        presented
    }

    /// Execute a single cycle against the active entity.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.poll_selection();
        let entity = self.active.clone();

        let outcome = refresh(
            self.sampler.as_ref(),
            self.store.clone(),
            &entity,
            self.enforce_monotonic,
        )
        .await;

        match outcome {
            Ok((series, insight)) => {
                debug!(
                    entity = %entity,
                    entries = series.len(),
                    anomalies = insight.anomaly_count,
                    "Presenting insight"
                );
                if let Err(e) = self.presenter.present(&entity, &series, &insight) {
                    error!(entity = %entity, "Presenter failed: {}", e);
                }
                CycleOutcome::Presented {
                    entries: series.len(),
                }
            }
            Err(e) => {
                match &e {
                    CycleError::Store(_) | CycleError::Task(_) => {
                        error!(entity = %entity, "Cycle aborted: {}", e)
                    }
                    _ => warn!(entity = %entity, "Cycle skipped: {}", e),
                }
                if let Err(pe) = self.presenter.report_error(&entity, &e) {
                    error!(entity = %entity, "Presenter failed: {}", pe);
                }
                CycleOutcome::Skipped(e)
            }
        }
    }

    fn poll_selection(&mut self) {
        let next = match self.selection.as_mut() {
            Some(rx) if rx.has_changed().unwrap_or(false) => rx.borrow_and_update().clone(),
            _ => return,
        };
        self.select_entity(next);
    }
}

async fn refresh(
    sampler: &dyn Sampler,
    store: Arc<dyn SeriesStore>,
    entity: &str,
    enforce_monotonic: bool,
) -> Result<(Vec<Sample>, Insight), CycleError> {
    let sample = sampler.fetch(entity).await?;

    // SQLite calls block; keep them off the async workers
    let series =
        tokio::task::spawn_blocking(move || persist(store.as_ref(), sample, enforce_monotonic))
            .await??;

    // Insight always runs over an owned snapshot of the full history
    let insight = insight::compute(&series);
    Ok((series, insight))
}

/// Append `sample` and return the entity's full history.
fn persist(
    store: &dyn SeriesStore,
    sample: Sample,
    enforce_monotonic: bool,
) -> Result<Vec<Sample>, CycleError> {
    if enforce_monotonic {
        if let Some(last) = store.last_timestamp(&sample.entity_key)? {
            if sample.timestamp < last {
                return Err(CycleError::OutOfOrder {
                    last,
                    got: sample.timestamp,
                });
            }
        }
    }

    store.append(&sample)?;
    info!(entity = %sample.entity_key, value = sample.value, timestamp = %sample.timestamp, "Sample stored");

    Ok(store.read_all(&sample.entity_key)?)
}

/// Counts from a [`backfill`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backfill {
    pub saved: usize,
    pub skipped: usize,
}

/// Append historical samples outside the polling loop.
///
/// With `enforce_monotonic` set, a sample is only appended when it is strictly
/// newer than the last stored one for its entity, so old history never lands
/// behind live samples and repeating a backfill adds nothing.
pub fn backfill(
    store: &dyn SeriesStore,
    samples: &[Sample],
    enforce_monotonic: bool,
) -> Result<Backfill, StoreError> {
    let mut report = Backfill::default();
    let mut last: HashMap<&str, Option<DateTime<Utc>>> = HashMap::new();

    for sample in samples {
        if enforce_monotonic {
            let newest = match last.get(sample.entity_key.as_str()) {
                Some(t) => *t,
                None => store.last_timestamp(&sample.entity_key)?,
            };
            if newest.is_some_and(|t| sample.timestamp <= t) {
                report.skipped += 1;
                continue;
            }
        }
        store.append(sample)?;
        last.insert(sample.entity_key.as_str(), Some(sample.timestamp));
        report.saved += 1;
    }

    if report.skipped > 0 {
        warn!(
            saved = report.saved,
            skipped = report.skipped,
            "Skipped samples not newer than the stored series"
        );
    }
    Ok(report)
}
