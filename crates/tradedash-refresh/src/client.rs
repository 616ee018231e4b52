//! HTTP client for the dashboard backend.
//!
//! Every call branches on HTTP status first. Non-success responses go through
//! a structured-error parse (`{ error, message?, traceback? }`) before falling
//! back to a generic status-code message.
//!
//! ## Example
//!
//! ```no_run
//! use tradedash_core::DashboardConfig;
//! use tradedash_refresh::client::DashboardClient;
//!
//! # async fn example() -> tradedash_core::Result<()> {
//! let client = DashboardClient::from_config(&DashboardConfig::default())?;
//! let holdings = client.get_data("/api/holdings", &[]).await?;
//! let status = client.get_status().await?;
//! println!("{} jobs, running: {}", status.jobs.len(), status.scheduler_running);
//! # let _ = holdings;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use tradedash_core::{DashError, DashboardConfig, ErrorInfo, Payload, Result};

/// Scheduler status endpoint.
pub const STATUS_PATH: &str = "/api/scheduler/status";

/// Prefix for job action endpoints.
pub const JOBS_PATH: &str = "/api/scheduler/jobs";

/// Scheduler status payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the backend scheduler loop is running
    pub scheduler_running: bool,
    /// Registered jobs
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// Error reported by the backend alongside a 200
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Next scheduled run (backend-formatted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<String>,
    /// Trigger description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Any other fields the backend sends
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// A job without a next run time is paused.
    pub fn is_paused(&self) -> bool {
        self.next_run_time.is_none()
    }
}

/// Job action endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Pause,
    Resume,
    Run,
}

impl JobAction {
    /// Path segment for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Run => "run",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pause" => Ok(JobAction::Pause),
            "resume" => Ok(JobAction::Resume),
            "run" => Ok(JobAction::Run),
            other => Err(format!("unknown job action '{other}' (expected pause, resume or run)")),
        }
    }
}

/// Response body of a job action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobActionResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobActionRequest<'a> {
    parameters: &'a Map<String, Value>,
}

/// Structured error body returned by the backend.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
}

impl ErrorBody {
    /// `error` wins over `message`; the traceback becomes the server trace.
    fn into_error_info(self) -> Option<ErrorInfo> {
        let message = self.error.or(self.message)?;
        Some(ErrorInfo {
            message,
            server_trace: self.traceback,
        })
    }
}

/// Parse a non-success body, falling back to the status code.
pub fn error_from_body(status: u16, body: &str) -> DashError {
    match serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_error_info)
    {
        Some(info) => DashError::Http { status, info },
        None => DashError::HttpStatus { status },
    }
}

/// Extract an embedded `{ error, traceback }` from a success body, if present.
fn embedded_error(body: &Value) -> Option<ErrorInfo> {
    let message = body.get("error")?.as_str()?.to_string();
    let server_trace = body
        .get("traceback")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(ErrorInfo {
        message,
        server_trace,
    })
}

/// Client for the dashboard backend.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: reqwest::Client,
    base_url: String,
}

impl DashboardClient {
    /// Create a client from configuration.
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Create a client for `base_url` with a request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DashError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch a data-region endpoint and return its `data` field.
    pub async fn get_data(&self, path: &str, query: &[(String, String)]) -> Result<Payload> {
        debug!(path, "fetching region data");
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let mut body = read_json(response, path).await?;
        if let Some(info) = embedded_error(&body) {
            return Err(DashError::Backend { info });
        }
        match body.get_mut("data") {
            Some(data) => Ok(data.take()),
            None => Err(DashError::malformed(path, "missing `data` field")),
        }
    }

    /// Fetch the scheduler status.
    pub async fn get_status(&self) -> Result<SchedulerStatus> {
        let response = self
            .client
            .get(self.url(STATUS_PATH))
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_json(response, STATUS_PATH).await?;
        if let Some(info) = embedded_error(&body) {
            return Err(DashError::Backend { info });
        }
        serde_json::from_value(body).map_err(|e| DashError::malformed(STATUS_PATH, e.to_string()))
    }

    /// Trigger a job action.
    ///
    /// A body that is not JSON is reported as a transport-level error with the
    /// raw status code.
    pub async fn job_action(
        &self,
        job_id: &str,
        action: JobAction,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<JobActionResponse> {
        let path = format!("{JOBS_PATH}/{job_id}/{action}");
        debug!(job_id, %action, "sending job action");

        let mut request = self.client.post(self.url(&path));
        if let Some(parameters) = parameters {
            request = request.json(&JobActionRequest { parameters });
        }
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        let body: JobActionResponse = serde_json::from_str(&text).map_err(|_| {
            DashError::transport(format!("unexpected non-JSON response (HTTP {status})"))
        })?;

        if !(200..300).contains(&status) {
            return Err(error_from_body(status, &text));
        }
        if let Some(message) = body.error.clone() {
            return Err(DashError::Backend {
                info: ErrorInfo::new(message),
            });
        }
        if body.success == Some(false) {
            return Err(DashError::Backend {
                info: ErrorInfo::new(format!("{action} failed for job {job_id}")),
            });
        }
        Ok(body)
    }
}

fn transport_error(e: reqwest::Error) -> DashError {
    if e.is_timeout() {
        DashError::transport(format!("request timed out: {e}"))
    } else {
        DashError::transport(e.to_string())
    }
}

async fn read_json(response: reqwest::Response, context: &str) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| DashError::malformed(context, e.to_string()))
}
