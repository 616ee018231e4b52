//! Page controllers.
//!
//! A page declares its regions, owns a [`PageSession`](crate::session::PageSession)
//! and forwards settled results to a [`RenderSink`](crate::render::RenderSink).

pub mod dashboard;
pub mod jobs;
pub mod regions;

pub use dashboard::DashboardPage;
pub use jobs::JobsPage;
pub use regions::{EndpointRegion, GridRegion, StatusRegion};
