//! Dashboard page: portfolio summary, holdings, charts and the trades grid.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};
use tradedash_core::{DashError, DashboardConfig, RegionState, Result, ThemeId};

use crate::client::DashboardClient;
use crate::coordinator::RegionRefreshCoordinator;
use crate::error_area::{ErrorScope, ErrorSeverity};
use crate::page::regions::{EndpointRegion, GridRegion};
use crate::region::{RefreshReport, Region, RegionOutcome};
use crate::render::RenderSink;
use crate::session::PageSession;
use crate::theme::SubscriptionId;

pub const SUMMARY: &str = "summary";
pub const HOLDINGS: &str = "holdings";
pub const ALLOCATION_CHART: &str = "allocation_chart";
pub const PERFORMANCE_CHART: &str = "performance_chart";
pub const TRADES_GRID: &str = "trades_grid";

/// Default endpoint per region id.
pub const DEFAULT_ENDPOINTS: [(&str, &str); 5] = [
    (SUMMARY, "/api/portfolio/summary"),
    (HOLDINGS, "/api/portfolio/holdings"),
    (ALLOCATION_CHART, "/api/portfolio/allocation"),
    (PERFORMANCE_CHART, "/api/portfolio/performance"),
    (TRADES_GRID, "/api/trades"),
];

/// Dashboard page controller.
pub struct DashboardPage {
    coordinator: Arc<RegionRefreshCoordinator>,
    session: Arc<PageSession>,
    sink: Arc<dyn RenderSink>,
    subscriptions: Vec<SubscriptionId>,
}

impl std::fmt::Debug for DashboardPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardPage")
            .field("coordinator", &self.coordinator)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl DashboardPage {
    /// Build the page with its standard regions.
    ///
    /// Endpoint paths can be overridden per region in the configuration.
    pub fn new(
        config: &DashboardConfig,
        client: Arc<DashboardClient>,
        session: Arc<PageSession>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let endpoint = |id: &str, default: &str| {
            EndpointRegion::new(
                id,
                config.region_path(id, default),
                Arc::clone(&client),
                Arc::clone(&sink),
            )
        };

        let mut regions: Vec<Arc<dyn Region>> = Vec::with_capacity(DEFAULT_ENDPOINTS.len());
        for (id, default) in DEFAULT_ENDPOINTS {
            let region: Arc<dyn Region> = match id {
                PERFORMANCE_CHART => Arc::new(endpoint(id, default).theme_sensitive()),
                TRADES_GRID => Arc::new(GridRegion::new(
                    endpoint(id, default),
                    Arc::clone(&session),
                )),
                _ => Arc::new(endpoint(id, default)),
            };
            regions.push(region);
        }

        Self::with_regions(regions, session, sink)
    }

    /// Build the page from an explicit region set.
    ///
    /// Theme-sensitive regions are subscribed to the session's theme
    /// broadcast; each theme change re-runs that region's refresh.
    pub fn with_regions(
        regions: Vec<Arc<dyn Region>>,
        session: Arc<PageSession>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let sensitive: Vec<String> = regions
            .iter()
            .filter(|r| r.theme_sensitive())
            .map(|r| r.id().to_string())
            .collect();
        let coordinator = Arc::new(RegionRefreshCoordinator::new(regions, Arc::clone(&session)));

        let subscriptions = sensitive
            .into_iter()
            .map(|id| {
                let weak = Arc::downgrade(&coordinator);
                session
                    .broadcast()
                    .subscribe(move |theme| refresh_on_theme(&weak, &id, theme))
            })
            .collect();

        Self {
            coordinator,
            session,
            sink,
            subscriptions,
        }
    }

    pub fn session(&self) -> &Arc<PageSession> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RegionRefreshCoordinator> {
        &self.coordinator
    }

    pub fn region_ids(&self) -> Vec<&str> {
        self.coordinator.region_ids()
    }

    pub fn region_state(&self, region_id: &str) -> Option<RegionState> {
        self.coordinator.state(region_id)
    }

    pub fn states(&self) -> HashMap<String, RegionState> {
        self.coordinator.states()
    }

    /// Refresh every region, then show or clear the page banner.
    pub async fn refresh_all(&self) -> RefreshReport {
        let report = self.coordinator.refresh_all().await;
        match report.aggregate_error() {
            Some(banner) => {
                self.session
                    .errors()
                    .record(ErrorScope::Page, ErrorSeverity::Warning, banner.clone());
                self.sink.show_banner(&banner);
            }
            None => {
                self.session.errors().resolve(&ErrorScope::Page);
                self.sink.clear_banner();
            }
        }
        info!(
            page = self.session.name(),
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            "dashboard refreshed"
        );
        report
    }

    /// Refresh a single region. Siblings are untouched.
    pub async fn refresh_region(&self, region_id: &str) -> Result<RegionOutcome> {
        self.coordinator.refresh_one(region_id).await
    }

    /// Set a region filter and re-run only that region.
    pub async fn set_filter(
        &self,
        region_id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<RegionOutcome> {
        if self.coordinator.state(region_id).is_none() {
            return Err(DashError::unknown_region(region_id));
        }
        self.session.set_filter(region_id, key, value);
        self.refresh_region(region_id).await
    }

    /// Publish a new theme to every subscriber of the session broadcast.
    pub fn set_theme(&self, theme: ThemeId) -> usize {
        self.session.broadcast().publish(theme)
    }
}

impl Drop for DashboardPage {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.session.broadcast().unsubscribe(id);
        }
    }
}

fn refresh_on_theme(
    coordinator: &Weak<RegionRefreshCoordinator>,
    region_id: &str,
    theme: &ThemeId,
) {
    let Some(coordinator) = coordinator.upgrade() else {
        return;
    };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(region = region_id, %theme, "no runtime, theme refresh skipped");
        return;
    };

    debug!(region = region_id, %theme, "theme changed, refreshing region");
    let region_id = region_id.to_string();
    runtime.spawn(async move {
        if let Err(e) = coordinator.refresh_one(&region_id).await {
            warn!(region = %region_id, error = %e, "theme refresh failed");
        }
    });
}
