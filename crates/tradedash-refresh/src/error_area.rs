//! Page error area.
//!
//! Errors never block the page. A failing region degrades in place, the
//! error is recorded here with the scope it belongs to, and the scope is
//! marked recovered on its next success. The page banner and the widget
//! failure notice both read from this log.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use tradedash_core::ErrorInfo;

/// Maximum number of errors kept for display.
const MAX_ERROR_HISTORY: usize = 50;

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Noteworthy, nothing failed
    Info,
    /// Transient failure, retrying
    Warning,
    /// Component failed and is degraded
    Error,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// Where an error belongs on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorScope {
    /// A single data region
    Region(String),
    /// The status poller
    Poller,
    /// The shared grid widget
    Widget,
    /// Page-level banner
    Page,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Region(id) => write!(f, "region:{id}"),
            ErrorScope::Poller => write!(f, "poller"),
            ErrorScope::Widget => write!(f, "widget"),
            ErrorScope::Page => write!(f, "page"),
        }
    }
}

/// A recorded error with context.
#[derive(Debug, Clone)]
pub struct RecordedError {
    /// Unique identifier
    pub id: usize,
    pub scope: ErrorScope,
    pub severity: ErrorSeverity,
    pub info: ErrorInfo,
    pub timestamp: DateTime<Utc>,
    /// The user dismissed it
    pub acknowledged: bool,
    /// The scope succeeded again since
    pub resolved: bool,
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.scope, self.info.message)
    }
}

/// Error log for one page.
#[derive(Debug)]
pub struct ErrorLog {
    errors: VecDeque<RecordedError>,
    next_id: usize,
    degraded: Vec<ErrorScope>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorLog {
    pub fn new() -> Self {
        Self {
            errors: VecDeque::new(),
            next_id: 1,
            degraded: Vec::new(),
        }
    }

    /// Record an error and return its id. The scope becomes degraded.
    pub fn record(&mut self, scope: ErrorScope, severity: ErrorSeverity, info: ErrorInfo) -> usize {
        let id = self.next_id;
        self.next_id += 1;

        let recorded = RecordedError {
            id,
            scope: scope.clone(),
            severity,
            info,
            timestamp: Utc::now(),
            acknowledged: false,
            resolved: false,
        };

        match severity {
            ErrorSeverity::Info => info!("{}", recorded),
            ErrorSeverity::Warning => warn!("{}", recorded),
            ErrorSeverity::Error => error!("{}", recorded),
        }

        if severity >= ErrorSeverity::Warning && !self.degraded.contains(&scope) {
            self.degraded.push(scope);
        }

        if self.errors.len() >= MAX_ERROR_HISTORY {
            self.errors.pop_front();
        }
        self.errors.push_back(recorded);
        id
    }

    /// Mark every error of `scope` resolved. Returns true if it was degraded.
    pub fn resolve(&mut self, scope: &ErrorScope) -> bool {
        for e in self.errors.iter_mut().filter(|e| &e.scope == scope) {
            e.resolved = true;
        }
        let was_degraded = self.degraded.contains(scope);
        if was_degraded {
            self.degraded.retain(|s| s != scope);
            info!("{} recovered", scope);
        }
        was_degraded
    }

    pub fn is_degraded(&self, scope: &ErrorScope) -> bool {
        self.degraded.contains(scope)
    }

    pub fn degraded(&self) -> &[ErrorScope] {
        &self.degraded
    }

    /// Acknowledge an error (user has seen it).
    pub fn acknowledge(&mut self, error_id: usize) {
        if let Some(e) = self.errors.iter_mut().find(|e| e.id == error_id) {
            e.acknowledged = true;
        }
    }

    /// Errors neither acknowledged nor resolved.
    pub fn active(&self) -> Vec<&RecordedError> {
        self.errors
            .iter()
            .filter(|e| !e.acknowledged && !e.resolved)
            .collect()
    }

    /// Last `count` errors, oldest first.
    pub fn recent(&self, count: usize) -> Vec<&RecordedError> {
        let skip = self.errors.len().saturating_sub(count);
        self.errors.iter().skip(skip).collect()
    }

    /// Errors for one scope.
    pub fn for_scope(&self, scope: &ErrorScope) -> Vec<&RecordedError> {
        self.errors.iter().filter(|e| &e.scope == scope).collect()
    }

    pub fn total(&self) -> usize {
        self.errors.len()
    }
}

/// Thread-safe handle to a page's [`ErrorLog`].
#[derive(Debug, Clone, Default)]
pub struct ErrorArea {
    inner: Arc<Mutex<ErrorLog>>,
}

impl ErrorArea {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ErrorLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, scope: ErrorScope, severity: ErrorSeverity, info: ErrorInfo) -> usize {
        self.lock().record(scope, severity, info)
    }

    pub fn resolve(&self, scope: &ErrorScope) -> bool {
        self.lock().resolve(scope)
    }

    pub fn is_degraded(&self, scope: &ErrorScope) -> bool {
        self.lock().is_degraded(scope)
    }

    pub fn degraded(&self) -> Vec<ErrorScope> {
        self.lock().degraded().to_vec()
    }

    pub fn acknowledge(&self, error_id: usize) {
        self.lock().acknowledge(error_id);
    }

    pub fn active(&self) -> Vec<RecordedError> {
        self.lock().active().into_iter().cloned().collect()
    }

    pub fn recent(&self, count: usize) -> Vec<RecordedError> {
        self.lock().recent(count).into_iter().cloned().collect()
    }

    pub fn for_scope(&self, scope: &ErrorScope) -> Vec<RecordedError> {
        self.lock().for_scope(scope).into_iter().cloned().collect()
    }

    pub fn total(&self) -> usize {
        self.lock().total()
    }
}
