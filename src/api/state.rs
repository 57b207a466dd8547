use crate::present::DashboardView;
use crate::storage::SeriesStore;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SeriesStore>,
    pub view: DashboardView,
    /// Active-entity selection consumed by the cycle driver.
    pub selection: Arc<watch::Sender<String>>,
    /// Entity keys a client may select.
    pub entities: Arc<Vec<String>>,
}
