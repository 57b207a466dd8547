use super::Presenter;
use crate::driver::CycleError;
use crate::insight::Insight;
use crate::sampler::Sample;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Latest published view for the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub entity_key: String,
    pub series: Vec<Sample>,
    pub insight: Insight,
    /// Set when the most recent cycle failed; series and insight are then stale.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Shared handle to the latest [`Dashboard`]. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    inner: Arc<RwLock<Option<Dashboard>>>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Dashboard> {
        self.inner.read().clone()
    }

    fn publish(&self, dashboard: Dashboard) {
        *self.inner.write() = Some(dashboard);
    }

    fn record_error(&self, entity_key: &str, message: String) {
        let mut slot = self.inner.write();
        match slot.as_mut() {
            Some(current) if current.entity_key == entity_key => {
                current.last_error = Some(message);
                current.updated_at = Utc::now();
            }
            _ => {
                *slot = Some(Dashboard {
                    entity_key: entity_key.to_string(),
                    series: Vec::new(),
                    insight: Insight::default(),
                    last_error: Some(message),
                    updated_at: Utc::now(),
                });
            }
        }
    }
}

/// Publishes every cycle into a [`DashboardView`].
pub struct DashboardPresenter {
    view: DashboardView,
}

impl DashboardPresenter {
    pub fn new(view: DashboardView) -> Self {
        Self { view }
    }
}

impl Presenter for DashboardPresenter {
    fn present(&mut self, entity_key: &str, series: &[Sample], insight: &Insight) -> Result<()> {
        self.view.publish(Dashboard {
            entity_key: entity_key.to_string(),
            series: series.to_vec(),
            insight: insight.clone(),
            last_error: None,
            updated_at: Utc::now(),
        });
        Ok(())
    }

    fn report_error(&mut self, entity_key: &str, error: &CycleError) -> Result<()> {
        self.view.record_error(entity_key, error.to_string());
        Ok(())
    }
}
