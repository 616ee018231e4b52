//! Concrete regions used by the pages.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use tradedash_core::{DashError, ErrorInfo, Payload, Result, Row};

use crate::client::{DashboardClient, Job, SchedulerStatus};
use crate::region::{FetchContext, Region};
use crate::render::RenderSink;
use crate::session::PageSession;

/// Region backed by a `{ data }` endpoint, rendered through the sink.
pub struct EndpointRegion {
    id: String,
    path: String,
    theme_sensitive: bool,
    client: Arc<DashboardClient>,
    sink: Arc<dyn RenderSink>,
}

impl EndpointRegion {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        client: Arc<DashboardClient>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            theme_sensitive: false,
            client,
            sink,
        }
    }

    /// Re-run on theme change and send the theme with each fetch.
    pub fn theme_sensitive(mut self) -> Self {
        self.theme_sensitive = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Region for EndpointRegion {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Payload> {
        self.client
            .get_data(&self.path, &ctx.query(self.theme_sensitive))
            .await
    }

    fn render(&self, payload: &Payload) -> Result<()> {
        self.sink.render_region(&self.id, payload);
        Ok(())
    }

    fn on_error(&self, error: &ErrorInfo) {
        self.sink.render_region_error(&self.id, error);
    }

    fn theme_sensitive(&self) -> bool {
        self.theme_sensitive
    }
}

/// Extract grid rows from a payload.
///
/// Accepts a bare array or an object carrying a `rows` array.
pub fn rows_from_payload(payload: &Payload) -> Result<Vec<Row>> {
    match payload {
        Payload::Array(rows) => Ok(rows.clone()),
        Payload::Object(map) => match map.get("rows") {
            Some(Payload::Array(rows)) => Ok(rows.clone()),
            _ => Err(DashError::malformed("grid payload", "expected a `rows` array")),
        },
        _ => Err(DashError::malformed("grid payload", "expected an array of rows")),
    }
}

/// Region whose rows go into the page's shared grid.
pub struct GridRegion {
    inner: EndpointRegion,
    session: Arc<PageSession>,
}

impl GridRegion {
    pub fn new(inner: EndpointRegion, session: Arc<PageSession>) -> Self {
        Self { inner, session }
    }

    fn push(&self, payload: &Payload) -> Result<usize> {
        let rows = rows_from_payload(payload)?;
        let report = self.session.grid().push_rows(&rows)?;
        if report.reconstructed {
            debug!(region = self.inner.id(), "grid rebuilt before push");
        }
        Ok(report.rows)
    }
}

#[async_trait]
impl Region for GridRegion {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Payload> {
        self.inner.fetch(ctx).await
    }

    fn render(&self, payload: &Payload) -> Result<()> {
        let rows = self.push(payload).inspect_err(|e| {
            warn!(region = self.id(), error = %e, "grid push failed");
        })?;
        self.inner
            .sink
            .render_region(self.id(), &json!({ "rows": rows }));
        Ok(())
    }

    fn on_error(&self, error: &ErrorInfo) {
        self.inner.on_error(error);
    }
}

/// Scheduler status block of the jobs page.
pub struct StatusRegion {
    client: Arc<DashboardClient>,
    session: Arc<PageSession>,
    sink: Arc<dyn RenderSink>,
}

impl StatusRegion {
    pub const ID: &'static str = "scheduler_status";

    pub fn new(
        client: Arc<DashboardClient>,
        session: Arc<PageSession>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            client,
            session,
            sink,
        }
    }
}

/// Grid row for one job.
pub fn job_row(job: &Job) -> Row {
    json!({
        "id": job.id,
        "name": job.name,
        "next_run_time": job.next_run_time,
        "trigger": job.trigger,
        "status": if job.is_paused() { "paused" } else { "scheduled" },
    })
}

#[async_trait]
impl Region for StatusRegion {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<Payload> {
        let status = self.client.get_status().await?;
        serde_json::to_value(status).map_err(|e| DashError::internal(e.to_string()))
    }

    fn render(&self, payload: &Payload) -> Result<()> {
        let status: SchedulerStatus = serde_json::from_value(payload.clone())
            .map_err(|e| DashError::malformed("scheduler status", e.to_string()))?;

        let rows: Vec<Row> = status.jobs.iter().map(job_row).collect();
        self.sink.render_region(
            Self::ID,
            &json!({
                "scheduler_running": status.scheduler_running,
                "jobs": rows.len(),
            }),
        );
        self.session.grid().push_rows(&rows)?;
        Ok(())
    }

    fn on_error(&self, error: &ErrorInfo) {
        self.sink.render_region_error(Self::ID, error);
    }

    fn on_recovered(&self) {
        self.sink.show_notice(Self::ID, "Connection restored");
    }
}
