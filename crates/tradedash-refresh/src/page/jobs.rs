//! Jobs page: scheduler status under adaptive polling, plus job actions.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};
use tradedash_core::{DashboardConfig, Result};

use crate::client::{DashboardClient, JobAction, JobActionResponse};
use crate::error_area::{ErrorScope, ErrorSeverity};
use crate::page::regions::StatusRegion;
use crate::poller::{AdaptivePoller, PollState};
use crate::render::RenderSink;
use crate::session::PageSession;

/// Jobs page controller.
pub struct JobsPage {
    client: Arc<DashboardClient>,
    session: Arc<PageSession>,
    sink: Arc<dyn RenderSink>,
    poller: AdaptivePoller,
}

impl std::fmt::Debug for JobsPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsPage")
            .field("base_url", &self.client.base_url())
            .field("poller", &self.poller)
            .finish()
    }
}

impl JobsPage {
    pub fn new(
        config: &DashboardConfig,
        client: Arc<DashboardClient>,
        session: Arc<PageSession>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let region = Arc::new(StatusRegion::new(
            Arc::clone(&client),
            Arc::clone(&session),
            Arc::clone(&sink),
        ));
        let poller = AdaptivePoller::new(region, Arc::clone(&session), config.poller);
        Self {
            client,
            session,
            sink,
            poller,
        }
    }

    pub fn session(&self) -> &Arc<PageSession> {
        &self.session
    }

    /// Start polling the scheduler status.
    pub fn start(&self) -> Result<()> {
        self.poller.start()
    }

    /// Stop polling. Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        self.poller.stop()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Poll now, ignoring any pending backoff.
    pub fn refresh_now(&self) -> Result<()> {
        self.poller.refresh_now()
    }

    pub fn poll_state(&self) -> PollState {
        self.poller.state()
    }

    pub async fn pause_job(&self, job_id: &str) -> Result<JobActionResponse> {
        self.job_action(job_id, JobAction::Pause).await
    }

    pub async fn resume_job(&self, job_id: &str) -> Result<JobActionResponse> {
        self.job_action(job_id, JobAction::Resume).await
    }

    pub async fn run_job(&self, job_id: &str) -> Result<JobActionResponse> {
        self.job_action(job_id, JobAction::Run).await
    }

    /// Send a job action; on success a running poller polls immediately.
    pub async fn job_action(&self, job_id: &str, action: JobAction) -> Result<JobActionResponse> {
        self.job_action_with(job_id, action, None).await
    }

    /// Send a job action carrying a `parameters` object.
    pub async fn job_action_with(
        &self,
        job_id: &str,
        action: JobAction,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<JobActionResponse> {
        match self.client.job_action(job_id, action, parameters).await {
            Ok(response) => {
                info!(job_id, %action, "job action accepted");
                let notice = response
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{action} sent for job {job_id}"));
                self.sink.show_notice(StatusRegion::ID, &notice);
                if self.poller.is_running() {
                    self.poller.refresh_now()?;
                }
                Ok(response)
            }
            Err(e) => {
                warn!(job_id, %action, error = %e, "job action failed");
                let info = e.to_error_info();
                self.session
                    .errors()
                    .record(ErrorScope::Page, ErrorSeverity::Error, info.clone());
                self.sink.render_region_error(StatusRegion::ID, &info);
                Err(e)
            }
        }
    }
}
