//! Explicit page session.
//!
//! Everything a page used to keep in ambient state (current filters, the grid
//! handle, the error log, the theme) lives here and is passed to the
//! coordinator, the poller and the regions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tradedash_core::ThemeId;

use crate::error_area::ErrorArea;
use crate::region::FetchContext;
use crate::theme::ThemeBroadcast;
use crate::widget::{GridFactory, SharedWidget};

/// State owned by one page controller.
#[derive(Debug)]
pub struct PageSession {
    name: String,
    broadcast: Arc<ThemeBroadcast>,
    filters: Mutex<HashMap<String, BTreeMap<String, String>>>,
    errors: ErrorArea,
    grid: SharedWidget,
}

impl PageSession {
    /// Create a session for page `name`.
    pub fn new(
        name: impl Into<String>,
        broadcast: Arc<ThemeBroadcast>,
        grid_factory: Arc<dyn GridFactory>,
    ) -> Self {
        let errors = ErrorArea::new();
        Self {
            name: name.into(),
            broadcast,
            filters: Mutex::new(HashMap::new()),
            grid: SharedWidget::new(grid_factory, errors.clone()),
            errors,
        }
    }

    fn filters(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, String>>> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn theme(&self) -> ThemeId {
        self.broadcast.current()
    }

    pub fn broadcast(&self) -> &Arc<ThemeBroadcast> {
        &self.broadcast
    }

    pub fn errors(&self) -> &ErrorArea {
        &self.errors
    }

    pub fn grid(&self) -> &SharedWidget {
        &self.grid
    }

    /// Set one filter value for a region.
    pub fn set_filter(&self, region_id: &str, key: impl Into<String>, value: impl Into<String>) {
        self.filters()
            .entry(region_id.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Remove all filters of a region.
    pub fn clear_filters(&self, region_id: &str) {
        self.filters().remove(region_id);
    }

    pub fn filters_for(&self, region_id: &str) -> BTreeMap<String, String> {
        self.filters().get(region_id).cloned().unwrap_or_default()
    }

    /// Snapshot the context for dispatch `seq` of `region_id`.
    pub fn fetch_context(&self, region_id: &str, seq: u64) -> FetchContext {
        FetchContext {
            region_id: region_id.to_string(),
            seq,
            theme: self.theme(),
            filters: self.filters_for(region_id),
        }
    }
}
