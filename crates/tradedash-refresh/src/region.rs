//! Region trait and refresh outcomes.
//!
//! A region is one independently fetched and rendered unit of page data: a
//! chart, a table, the scheduler status block. Regions never depend on each
//! other's completion.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tradedash_core::{ErrorInfo, Payload, Result, ThemeId};

/// Snapshot handed to a region fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchContext {
    /// Region being fetched
    pub region_id: String,
    /// Sequence number of this dispatch (monotonic per region)
    pub seq: u64,
    /// Active theme at dispatch time
    pub theme: ThemeId,
    /// Region filters at dispatch time
    pub filters: BTreeMap<String, String>,
}

impl FetchContext {
    /// Query parameters for an endpoint fetch.
    ///
    /// Theme-sensitive regions also send the active theme so the backend can
    /// return theme-specific styling parameters.
    pub fn query(&self, include_theme: bool) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if include_theme {
            query.push(("theme".to_string(), self.theme.to_string()));
        }
        query
    }
}

/// One independently refreshed unit of page data.
///
/// `render` and `on_error` are the push seam towards the rendering
/// collaborator. Each settled fetch whose response was not discarded as
/// stale ends in either one successful `render` or one `on_error`.
#[async_trait]
pub trait Region: Send + Sync {
    /// Stable region identifier.
    fn id(&self) -> &str;

    /// Fetch the region payload.
    async fn fetch(&self, ctx: &FetchContext) -> Result<Payload>;

    /// Render a freshly fetched payload.
    ///
    /// An error (e.g. the grid could not be rebuilt) settles the region as
    /// failed and is shown through `on_error`.
    fn render(&self, payload: &Payload) -> Result<()>;

    /// Render an error scoped to this region.
    fn on_error(&self, error: &ErrorInfo);

    /// Called once when a failure streak ends (polled regions only).
    fn on_recovered(&self) {}

    /// Whether the region re-runs when the theme changes.
    fn theme_sensitive(&self) -> bool {
        false
    }
}

/// How one dispatch of one region ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Payload stored and rendered
    Rendered,
    /// Error stored and rendered in the region
    Failed(ErrorInfo),
    /// A newer dispatch was issued; the response was dropped
    Discarded,
}

/// Outcome of one region dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOutcome {
    pub region_id: String,
    pub seq: u64,
    pub settlement: Settlement,
}

impl RegionOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self.settlement, Settlement::Rendered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.settlement, Settlement::Failed(_))
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self.settlement, Settlement::Discarded)
    }

    /// Error carried by a failed settlement.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match &self.settlement {
            Settlement::Failed(info) => Some(info),
            _ => None,
        }
    }
}

/// Result of a multi-region refresh, available once every region settled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Outcomes in settlement order
    pub outcomes: Vec<RegionOutcome>,
}

impl RefreshReport {
    pub fn new(outcomes: Vec<RegionOutcome>) -> Self {
        Self { outcomes }
    }

    /// Regions that rendered data.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_rendered())
            .map(|o| o.region_id.as_str())
            .collect()
    }

    /// Regions that failed, with their errors.
    pub fn failed(&self) -> Vec<(&str, &ErrorInfo)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (o.region_id.as_str(), e)))
            .collect()
    }

    /// Number of stale responses dropped.
    pub fn discarded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_discarded()).count()
    }

    /// True when no region failed.
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(RegionOutcome::is_failed)
    }

    /// Union of region errors for a page-level banner.
    ///
    /// Regions that succeeded keep showing their data; the banner only lists
    /// the failures.
    pub fn aggregate_error(&self) -> Option<ErrorInfo> {
        let failed = self.failed();
        if failed.is_empty() {
            return None;
        }
        let names: Vec<&str> = failed.iter().map(|(id, _)| *id).collect();
        let details: Vec<String> = failed
            .iter()
            .map(|(id, e)| format!("{id}: {}", e.message))
            .collect();
        Some(ErrorInfo::with_trace(
            format!(
                "{} of {} regions failed to load ({})",
                failed.len(),
                self.outcomes.len() - self.discarded(),
                names.join(", ")
            ),
            details.join("\n"),
        ))
    }
}
