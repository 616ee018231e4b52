//! # tradedash-refresh
//!
//! Refresh orchestration and resilience for TradeDash pages.
//!
//! - [`coordinator`] - concurrent region refresh with per-region failure
//!   isolation and stale-response discard
//! - [`poller`] - status polling with two-tier backoff and recovery detection
//! - [`widget`] - capability-checked grid handle that heals once per push
//! - [`theme`] - theme change broadcast
//! - [`page`] - dashboard and jobs page controllers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tradedash_core::DashboardConfig;
//! use tradedash_refresh::{
//!     DashboardClient, DashboardPage, LogRenderSink, MemoryGridFactory, PageSession,
//!     ThemeBroadcast,
//! };
//!
//! # async fn example() -> tradedash_core::Result<()> {
//! let config = DashboardConfig::load_default()?;
//! let client = Arc::new(DashboardClient::from_config(&config)?);
//! let session = Arc::new(PageSession::new(
//!     "dashboard",
//!     ThemeBroadcast::global(),
//!     Arc::new(MemoryGridFactory::new()),
//! ));
//! let page = DashboardPage::new(&config, client, session, Arc::new(LogRenderSink));
//! let report = page.refresh_all().await;
//! println!("{} regions failed", report.failed().len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod error_area;
pub mod page;
pub mod poller;
pub mod region;
pub mod render;
pub mod session;
pub mod theme;
pub mod widget;

pub use client::{DashboardClient, Job, JobAction, JobActionResponse, SchedulerStatus};
pub use coordinator::RegionRefreshCoordinator;
pub use error_area::{ErrorArea, ErrorScope, ErrorSeverity};
pub use page::{DashboardPage, JobsPage};
pub use poller::{AdaptivePoller, PollPhase, PollState, PollStep};
pub use region::{FetchContext, RefreshReport, Region, RegionOutcome, Settlement};
pub use render::{LogRenderSink, MemoryGrid, MemoryGridFactory, RenderSink};
pub use session::PageSession;
pub use theme::{SubscriptionId, ThemeBroadcast};
pub use widget::{GridApi, GridFactory, GridOperation, SharedWidget, WidgetHandle, WidgetState};
