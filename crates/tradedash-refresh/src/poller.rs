//! Adaptive status polling.
//!
//! ```text
//! Idle -> Scheduled -> InFlight -> Success -> Scheduled
//!                              \-> Failure -> Backoff -> Scheduled
//! any state --stop()--> Stopped
//! ```
//!
//! The delay has two tiers instead of growing exponentially: `D0` after a
//! success and after the first failure of a streak, `Dmax` after every further
//! failure. The status payload is small and picking up again quickly after a
//! blip matters more than back-pressure.
//!
//! [`PollState`] holds the policy and is a plain state machine; the
//! [`AdaptivePoller`] task only drives it with a timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tradedash_core::{DashError, ErrorInfo, Payload, PollerConfig, Result};

use crate::error_area::{ErrorScope, ErrorSeverity};
use crate::region::Region;
use crate::session::PageSession;

/// Poller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    /// Waiting the normal delay after a success
    Scheduled,
    /// A status fetch is running
    InFlight,
    /// Waiting after a failure
    Backoff,
    Stopped,
}

/// What the driver does after a poll completed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Success {
        delay: Duration,
        /// First success after a failure streak
        recovered: bool,
    },
    Failure {
        delay: Duration,
        /// Failures in the current streak, including this one
        attempt: u32,
        /// Escalating user-visible error
        notice: ErrorInfo,
    },
}

impl PollStep {
    pub fn delay(&self) -> Duration {
        match self {
            PollStep::Success { delay, .. } | PollStep::Failure { delay, .. } => *delay,
        }
    }
}

/// Backoff bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub consecutive_failures: u32,
    pub current_delay: Duration,
    /// Set on the first failure of a streak, cleared by the next success
    pub recovering: bool,
    pub phase: PollPhase,
    base_delay: Duration,
    max_delay: Duration,
    /// Bumped by every start and stop; a task only applies steps of its own
    generation: u64,
}

impl PollState {
    pub fn new(config: PollerConfig) -> Self {
        let base_delay = config.base_delay();
        Self {
            consecutive_failures: 0,
            current_delay: base_delay,
            recovering: false,
            phase: PollPhase::Idle,
            base_delay,
            max_delay: config.max_delay().max(base_delay),
            generation: 0,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Record a successful poll.
    pub fn record_success(&mut self) -> PollStep {
        let recovered = self.recovering;
        self.consecutive_failures = 0;
        self.recovering = false;
        self.current_delay = self.base_delay;
        self.phase = PollPhase::Scheduled;
        PollStep::Success {
            delay: self.current_delay,
            recovered,
        }
    }

    /// Record a failed poll.
    pub fn record_failure(&mut self, error: &ErrorInfo) -> PollStep {
        self.consecutive_failures += 1;
        self.current_delay = if self.consecutive_failures == 1 {
            self.base_delay
        } else {
            self.max_delay
        };
        self.recovering = true;
        self.phase = PollPhase::Backoff;

        PollStep::Failure {
            delay: self.current_delay,
            attempt: self.consecutive_failures,
            notice: Self::failure_notice(self.consecutive_failures, self.current_delay, error),
        }
    }

    /// Forget the current failure streak (manual refresh).
    pub fn reset_streak(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.base_delay;
    }

    /// Back to a fresh `Idle` state.
    pub fn reset(&mut self) {
        self.reset_streak();
        self.recovering = false;
        self.phase = PollPhase::Idle;
    }

    /// Text escalates after the first failure so a blip reads differently
    /// from an outage.
    pub fn failure_notice(attempt: u32, delay: Duration, error: &ErrorInfo) -> ErrorInfo {
        let message = if attempt <= 1 {
            format!("{}. Retrying...", error.message.trim_end_matches('.'))
        } else {
            format!(
                "Connection lost ({attempt} attempts). Retrying in {}...",
                format_delay(delay)
            )
        };
        ErrorInfo {
            message,
            server_trace: error.server_trace.clone(),
        }
    }
}

/// `40ms` below one second, whole seconds (rounded up) above.
fn format_delay(delay: Duration) -> String {
    if delay < Duration::from_secs(1) {
        format!("{}ms", delay.as_millis())
    } else {
        format!("{}s", delay.as_secs_f64().ceil() as u64)
    }
}

struct PollerTask {
    handle: JoinHandle<()>,
    wake: Arc<Notify>,
}

/// Polls one region on a backoff-adjusted timer.
pub struct AdaptivePoller {
    region: Arc<dyn Region>,
    session: Arc<PageSession>,
    state: Arc<Mutex<PollState>>,
    task: Mutex<Option<PollerTask>>,
}

impl std::fmt::Debug for AdaptivePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptivePoller")
            .field("region", &self.region.id())
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AdaptivePoller {
    pub fn new(region: Arc<dyn Region>, session: Arc<PageSession>, config: PollerConfig) -> Self {
        Self {
            region,
            session,
            state: Arc::new(Mutex::new(PollState::new(config))),
            task: Mutex::new(None),
        }
    }

    /// Snapshot of the backoff state.
    pub fn state(&self) -> PollState {
        lock(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Start polling with an immediate first poll.
    ///
    /// From `Stopped` or `Idle` the state is reset. On a running poller this
    /// forces an immediate poll. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut task = lock(&self.task);
        if let Some(running) = task.as_ref()
            && !running.handle.is_finished()
        {
            running.wake.notify_one();
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DashError::internal(format!("poller needs a Tokio runtime: {e}")))?;

        let generation = {
            let mut state = lock(&self.state);
            state.reset();
            state.generation += 1;
            state.generation
        };
        let wake = Arc::new(Notify::new());
        let handle = runtime.spawn(run(
            Arc::clone(&self.region),
            Arc::clone(&self.session),
            Arc::clone(&self.state),
            Arc::clone(&wake),
            generation,
        ));
        *task = Some(PollerTask { handle, wake });
        info!(region = self.region.id(), "poller started");
        Ok(())
    }

    /// Cancel the pending timer. Returns false when already stopped.
    ///
    /// A fetch still in flight may complete, but its result is dropped: once
    /// this returns, the stopped task no longer touches state, the error area
    /// or the region.
    pub fn stop(&self) -> bool {
        let Some(task) = lock(&self.task).take() else {
            return false;
        };
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.phase = PollPhase::Stopped;
        }
        task.handle.abort();
        info!(region = self.region.id(), "poller stopped");
        true
    }

    /// Reset the failure streak and poll immediately, whatever the backoff.
    pub fn refresh_now(&self) -> Result<()> {
        let running = lock(&self.task)
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| Arc::clone(&t.wake));

        match running {
            Some(wake) => {
                lock(&self.state).reset_streak();
                debug!(region = self.region.id(), "manual refresh requested");
                wake.notify_one();
                Ok(())
            }
            None => self.start(),
        }
    }
}

impl Drop for AdaptivePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    region: Arc<dyn Region>,
    session: Arc<PageSession>,
    state: Arc<Mutex<PollState>>,
    wake: Arc<Notify>,
    generation: u64,
) {
    let mut seq = 0;
    loop {
        seq += 1;
        {
            let mut state = lock(&state);
            if state.generation != generation {
                return;
            }
            state.phase = PollPhase::InFlight;
        }
        let ctx = session.fetch_context(region.id(), seq);
        let result = region.fetch(&ctx).await;

        // Held through the callbacks, so a step is applied either entirely
        // before a concurrent stop() returns or not at all.
        let delay = {
            let mut state = lock(&state);
            if state.generation != generation {
                debug!(region = region.id(), seq, "poller stopped, result dropped");
                return;
            }
            let step = match &result {
                Ok(_) => state.record_success(),
                Err(e) => state.record_failure(&e.to_error_info()),
            };
            apply_step(region.as_ref(), &session, result, &step);
            step.delay()
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {
                debug!(region = region.id(), "poll forced");
            }
        }
    }
}

fn apply_step(
    region: &dyn Region,
    session: &PageSession,
    result: Result<Payload>,
    step: &PollStep,
) {
    let scope = ErrorScope::Poller;
    match (result, step) {
        (Ok(payload), PollStep::Success { recovered, .. }) => {
            if let Err(e) = region.render(&payload) {
                warn!(region = region.id(), error = %e, "status render failed");
                region.on_error(&e.to_error_info());
            }
            if *recovered {
                info!(region = region.id(), "status polling recovered");
                session.errors().resolve(&scope);
                region.on_recovered();
            }
        }
        (Err(e), PollStep::Failure { attempt, notice, delay }) => {
            warn!(
                region = region.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "status poll failed"
            );
            if *attempt == 1 {
                session
                    .errors()
                    .record(scope, ErrorSeverity::Warning, e.to_error_info());
            }
            region.on_error(notice);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollerConfig {
        PollerConfig {
            base_delay_ms: 5_000,
            max_delay_ms: 10_000,
        }
    }

    #[test]
    fn test_two_tier_delays() {
        let mut state = PollState::new(config());
        let err = ErrorInfo::new("connection refused");

        let delays: Vec<Duration> = (0..3).map(|_| state.record_failure(&err).delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(10)
            ]
        );
        assert_eq!(state.consecutive_failures, 3);
        assert!(state.recovering);

        let step = state.record_success();
        assert_eq!(
            step,
            PollStep::Success {
                delay: Duration::from_secs(5),
                recovered: true
            }
        );
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_delay, Duration::from_secs(5));
        assert!(!state.recovering);
    }

    #[test]
    fn test_recovered_emitted_once() {
        let mut state = PollState::new(config());
        state.record_failure(&ErrorInfo::new("down"));
        assert!(matches!(state.record_success(), PollStep::Success { recovered: true, .. }));
        assert!(matches!(state.record_success(), PollStep::Success { recovered: false, .. }));
    }

    #[test]
    fn test_failure_notice_escalates() {
        let mut state = PollState::new(config());
        let err = ErrorInfo::with_trace("Connection refused.", "trace");

        let PollStep::Failure { notice, .. } = state.record_failure(&err) else {
            panic!("expected failure step");
        };
        assert_eq!(notice.message, "Connection refused. Retrying...");
        assert_eq!(notice.server_trace.as_deref(), Some("trace"));

        let PollStep::Failure { notice, attempt, .. } = state.record_failure(&err) else {
            panic!("expected failure step");
        };
        assert_eq!(attempt, 2);
        assert_eq!(notice.message, "Connection lost (2 attempts). Retrying in 10s...");
    }

    #[test]
    fn test_sub_second_delay_shown_in_millis() {
        let err = ErrorInfo::new("down");
        let notice = PollState::failure_notice(3, Duration::from_millis(40), &err);
        assert_eq!(notice.message, "Connection lost (3 attempts). Retrying in 40ms...");
        let notice = PollState::failure_notice(2, Duration::from_millis(1_500), &err);
        assert_eq!(notice.message, "Connection lost (2 attempts). Retrying in 2s...");
    }

    #[test]
    fn test_reset_streak_returns_to_base_delay() {
        let mut state = PollState::new(config());
        state.record_failure(&ErrorInfo::new("x"));
        state.record_failure(&ErrorInfo::new("x"));
        state.reset_streak();

        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_delay, Duration::from_secs(5));
        let step = state.record_failure(&ErrorInfo::new("x"));
        assert_eq!(step.delay(), Duration::from_secs(5));
    }

    /// Region answering from a script, then succeeding forever.
    struct ScriptedStatus {
        script: Mutex<Vec<bool>>,
        fetched_at: Mutex<Vec<tokio::time::Instant>>,
        notices: Mutex<Vec<String>>,
        recovered: Mutex<u32>,
    }

    impl ScriptedStatus {
        fn new(script: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                fetched_at: Mutex::new(Vec::new()),
                notices: Mutex::new(Vec::new()),
                recovered: Mutex::new(0),
            })
        }

        fn offsets(&self, start: tokio::time::Instant) -> Vec<Duration> {
            self.fetched_at
                .lock()
                .unwrap()
                .iter()
                .map(|t| *t - start)
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Region for ScriptedStatus {
        fn id(&self) -> &str {
            "scheduler_status"
        }

        async fn fetch(
            &self,
            _ctx: &crate::region::FetchContext,
        ) -> Result<tradedash_core::Payload> {
            self.fetched_at.lock().unwrap().push(tokio::time::Instant::now());
            let ok = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() { true } else { script.remove(0) }
            };
            if ok {
                Ok(serde_json::json!({ "scheduler_running": true, "jobs": [] }))
            } else {
                Err(DashError::transport("connection refused"))
            }
        }

        fn render(&self, _payload: &tradedash_core::Payload) -> Result<()> {
            Ok(())
        }

        fn on_error(&self, error: &ErrorInfo) {
            self.notices.lock().unwrap().push(error.message.clone());
        }

        fn on_recovered(&self) {
            *self.recovered.lock().unwrap() += 1;
        }
    }

    fn session() -> Arc<PageSession> {
        Arc::new(PageSession::new(
            "jobs",
            Arc::new(crate::theme::ThemeBroadcast::default()),
            Arc::new(crate::render::MemoryGridFactory::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_backoff_schedule_and_recovery() {
        let region = ScriptedStatus::new(vec![false, false, false, true]);
        let session = session();
        let poller = AdaptivePoller::new(region.clone(), Arc::clone(&session), config());
        let start = tokio::time::Instant::now();

        poller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(26)).await;

        assert_eq!(
            region.offsets(start)[..4],
            [
                Duration::ZERO,
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(25)
            ]
        );
        assert_eq!(
            region.notices.lock().unwrap().as_slice(),
            [
                "connection refused. Retrying...",
                "Connection lost (2 attempts). Retrying in 10s...",
                "Connection lost (3 attempts). Retrying in 10s...",
            ]
        );
        assert_eq!(*region.recovered.lock().unwrap(), 1);
        assert!(!session.errors().is_degraded(&ErrorScope::Poller));
        // Only the first failure of the streak is logged to the error area
        assert_eq!(session.errors().for_scope(&ErrorScope::Poller).len(), 1);

        let state = poller.state();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_delay, Duration::from_secs(5));
        assert!(poller.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_skips_backoff() {
        let region = ScriptedStatus::new(vec![false, false, false]);
        let poller = AdaptivePoller::new(region.clone(), session(), config());
        let start = tokio::time::Instant::now();

        poller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(poller.state().consecutive_failures, 2);

        poller.refresh_now().unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let offsets = region.offsets(start);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[2], Duration::from_secs(6));
        // Streak restarted, so the next wait is the base delay again
        let state = poller.state();
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.current_delay, Duration::from_secs(5));
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let region = ScriptedStatus::new(vec![]);
        let poller = AdaptivePoller::new(region.clone(), session(), config());

        poller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(poller.is_running());

        assert!(poller.stop());
        assert!(!poller.stop());
        assert!(!poller.is_running());
        assert_eq!(poller.state().phase, PollPhase::Stopped);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(region.fetched_at.lock().unwrap().len(), 1);
    }

    /// Region whose first fetch blocks its worker thread, then fails.
    struct BlockingFirstFetch {
        calls: Mutex<u32>,
        notices: Mutex<Vec<String>>,
    }

    impl BlockingFirstFetch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(0),
                notices: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Region for BlockingFirstFetch {
        fn id(&self) -> &str {
            "scheduler_status"
        }

        async fn fetch(
            &self,
            _ctx: &crate::region::FetchContext,
        ) -> Result<tradedash_core::Payload> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls == 1
            };
            if first {
                std::thread::sleep(Duration::from_millis(300));
                return Err(DashError::transport("connection reset"));
            }
            Ok(serde_json::json!({ "scheduler_running": true, "jobs": [] }))
        }

        fn render(&self, _payload: &tradedash_core::Payload) -> Result<()> {
            Ok(())
        }

        fn on_error(&self, error: &ErrorInfo) {
            self.notices.lock().unwrap().push(error.message.clone());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fetch_completing_after_stop_is_dropped() {
        let region = BlockingFirstFetch::new();
        let session = session();
        let poller = AdaptivePoller::new(region.clone(), Arc::clone(&session), config());

        poller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(poller.stop());
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = poller.state();
        assert_eq!(state.phase, PollPhase::Stopped);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.recovering);
        assert!(region.notices.lock().unwrap().is_empty());
        assert!(session.errors().for_scope(&ErrorScope::Poller).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_is_not_affected_by_previous_run() {
        let region = BlockingFirstFetch::new();
        let poller = AdaptivePoller::new(region.clone(), session(), config());

        poller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop();
        poller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        // The restarted run succeeded; the old run's failure never landed
        assert_eq!(*region.calls.lock().unwrap(), 2);
        let state = poller.state();
        assert_eq!(state.phase, PollPhase::Scheduled);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.recovering);
        assert!(region.notices.lock().unwrap().is_empty());
        poller.stop();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let poller = AdaptivePoller::new(ScriptedStatus::new(vec![]), session(), config());
        assert!(matches!(poller.start(), Err(DashError::Internal { .. })));
    }

    #[test]
    fn test_max_delay_never_below_base() {
        let state = PollState::new(PollerConfig {
            base_delay_ms: 5_000,
            max_delay_ms: 1_000,
        });
        assert_eq!(state.max_delay(), state.base_delay());
    }
}
