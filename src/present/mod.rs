//! Presenters -- where each cycle's `(series, insight)` pair ends up.

pub mod console;
pub mod dashboard;

use crate::driver::CycleError;
use crate::insight::Insight;
use crate::sampler::Sample;
use anyhow::Result;

pub use self::console::ConsolePresenter;
pub use self::dashboard::{Dashboard, DashboardPresenter, DashboardView};

/// Receives the result of every cycle, once per tick.
pub trait Presenter: Send {
    /// Show a freshly computed insight alongside the series it came from.
    fn present(&mut self, entity_key: &str, series: &[Sample], insight: &Insight) -> Result<()>;

    /// Surface a failed cycle. Whatever was last presented stays visible.
    fn report_error(&mut self, entity_key: &str, error: &CycleError) -> Result<()>;
}
