//! Render seam towards the (external) presentation layer.
//!
//! Pages forward settled region results to a [`RenderSink`]. The headless
//! binary uses [`LogRenderSink`] and an in-memory grid.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use tradedash_core::{ErrorInfo, Payload, Result, Row};

use crate::widget::{GridApi, GridFactory, GridOperation};

/// Presentation collaborator.
pub trait RenderSink: Send + Sync {
    /// Show fresh data inside a region.
    fn render_region(&self, region_id: &str, payload: &Payload);

    /// Show an error inside a region. `error.server_trace` goes behind a
    /// "show details" toggle.
    fn render_region_error(&self, region_id: &str, error: &ErrorInfo);

    /// Show the page-level banner.
    fn show_banner(&self, error: &ErrorInfo);

    /// Hide the page-level banner.
    fn clear_banner(&self) {}

    /// Short non-error notice (recovered, action sent).
    fn show_notice(&self, _region_id: &str, _message: &str) {}
}

/// Error text shown inside a region, e.g. `Error loading holdings: db down`.
pub fn scoped_error_message(region_label: &str, error: &ErrorInfo) -> String {
    format!("Error loading {region_label}: {}", error.message)
}

/// Sink that writes every render to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRenderSink;

impl RenderSink for LogRenderSink {
    fn render_region(&self, region_id: &str, payload: &Payload) {
        info!(region = region_id, payload = %payload, "render");
    }

    fn render_region_error(&self, region_id: &str, error: &ErrorInfo) {
        warn!(
            region = region_id,
            details = error.server_trace.as_deref().unwrap_or(""),
            "{}",
            scoped_error_message(region_id, error)
        );
    }

    fn show_banner(&self, error: &ErrorInfo) {
        warn!(details = error.server_trace.as_deref().unwrap_or(""), "{}", error.message);
    }

    fn clear_banner(&self) {
        info!("banner cleared");
    }

    fn show_notice(&self, region_id: &str, message: &str) {
        info!(region = region_id, "{}", message);
    }
}

/// Grid that keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemoryGrid {
    rows: Mutex<Vec<Row>>,
}

impl MemoryGrid {
    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl GridApi for MemoryGrid {
    fn supports(&self, op: GridOperation) -> bool {
        matches!(op, GridOperation::SetRows)
    }

    fn set_rows(&self, rows: &[Row]) -> Result<()> {
        *self.rows.lock().unwrap_or_else(PoisonError::into_inner) = rows.to_vec();
        Ok(())
    }
}

/// Factory for [`MemoryGrid`]; remembers the latest instance.
#[derive(Debug, Default)]
pub struct MemoryGridFactory {
    latest: Mutex<Option<Arc<MemoryGrid>>>,
}

impl MemoryGridFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently constructed grid.
    pub fn latest(&self) -> Option<Arc<MemoryGrid>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl GridFactory for MemoryGridFactory {
    fn construct(&self) -> Result<Arc<dyn GridApi>> {
        let grid = Arc::new(MemoryGrid::default());
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&grid));
        Ok(grid)
    }
}
