//! Self-healing handle to the externally constructed data grid.
//!
//! The grid library can hand back an object that looks constructed but is
//! missing the operations we call on it. The handle therefore checks
//! capabilities on every push instead of trusting the constructor, and
//! rebuilds the widget at most once per push when the reference turns out
//! to be invalid.
//!
//! ```text
//! Uninitialized --construct--> Ready --push fails--> Stale --reconstruct--> Ready
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use tradedash_core::{DashError, Result, Row};

use crate::error_area::{ErrorArea, ErrorScope, ErrorSeverity};

/// Operations the handle relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOperation {
    /// Replace the full row set
    SetRows,
}

impl fmt::Display for GridOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridOperation::SetRows => f.write_str("set_rows"),
        }
    }
}

/// API surface of an externally constructed grid.
pub trait GridApi: Send + Sync {
    /// Whether the instance actually exposes `op`.
    fn supports(&self, op: GridOperation) -> bool;

    /// Replace all rows.
    fn set_rows(&self, rows: &[Row]) -> Result<()>;
}

/// Page collaborator that builds grid instances.
pub trait GridFactory: Send + Sync {
    fn construct(&self) -> Result<Arc<dyn GridApi>>;
}

/// Lifecycle state of a [`WidgetHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Uninitialized,
    Ready,
    Stale,
}

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    /// Rows written
    pub rows: usize,
    /// The widget was rebuilt during this push
    pub reconstructed: bool,
}

/// Owner of the grid reference.
pub struct WidgetHandle {
    factory: Arc<dyn GridFactory>,
    api: Option<Arc<dyn GridApi>>,
    ready: bool,
    constructions: u64,
}

impl fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetHandle")
            .field("state", &self.state())
            .field("constructions", &self.constructions)
            .finish()
    }
}

impl WidgetHandle {
    /// Create an uninitialized handle. Nothing is built until the first push.
    pub fn new(factory: Arc<dyn GridFactory>) -> Self {
        Self {
            factory,
            api: None,
            ready: false,
            constructions: 0,
        }
    }

    /// Capability check on the current reference.
    pub fn is_ready(&self) -> bool {
        self.ready
            && self
                .api
                .as_ref()
                .is_some_and(|api| api.supports(GridOperation::SetRows))
    }

    pub fn state(&self) -> WidgetState {
        if self.is_ready() {
            WidgetState::Ready
        } else if self.api.is_none() && self.constructions == 0 {
            WidgetState::Uninitialized
        } else {
            WidgetState::Stale
        }
    }

    /// Number of construction attempts so far (successful or not).
    pub fn constructions(&self) -> u64 {
        self.constructions
    }

    /// Discard the current reference and build a new one.
    pub fn reconstruct(&mut self) -> Result<()> {
        self.api = None;
        self.ready = false;
        self.constructions += 1;

        let api = self.factory.construct()?;
        if !api.supports(GridOperation::SetRows) {
            return Err(DashError::WidgetConstruction {
                message: format!(
                    "constructed grid does not expose {}",
                    GridOperation::SetRows
                ),
            });
        }
        self.api = Some(api);
        self.ready = true;
        debug!(constructions = self.constructions, "grid constructed");
        Ok(())
    }

    fn try_push(&self, rows: &[Row]) -> Result<()> {
        match &self.api {
            Some(api) if api.supports(GridOperation::SetRows) => api.set_rows(rows),
            _ => Err(DashError::widget_capability(GridOperation::SetRows.to_string())),
        }
    }

    /// Replace the grid rows, healing the reference at most once.
    ///
    /// A handle that is not ready is rebuilt before the push. A push that
    /// fails on a ready handle marks it stale, rebuilds once and retries
    /// once. Any further failure is returned and the handle stays stale.
    pub fn push_rows(&mut self, rows: &[Row]) -> Result<PushReport> {
        let mut reconstructed = false;
        if !self.is_ready() {
            self.reconstruct()?;
            reconstructed = true;
        }

        if let Err(e) = self.try_push(rows) {
            self.ready = false;
            if reconstructed {
                return Err(e);
            }
            warn!(error = %e, "grid push failed, rebuilding widget");
            self.reconstruct()?;
            reconstructed = true;
            if let Err(e) = self.try_push(rows) {
                self.ready = false;
                return Err(e);
            }
        }

        Ok(PushReport {
            rows: rows.len(),
            reconstructed,
        })
    }
}

/// Grid handle shared by every region of a page.
///
/// Pushes are serialized; each push replaces the full row set so the last
/// writer wins. Failures are reported to the page error area.
#[derive(Clone)]
pub struct SharedWidget {
    inner: Arc<Mutex<WidgetHandle>>,
    errors: ErrorArea,
}

impl fmt::Debug for SharedWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWidget")
            .field("handle", &*self.lock())
            .finish()
    }
}

impl SharedWidget {
    pub fn new(factory: Arc<dyn GridFactory>, errors: ErrorArea) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WidgetHandle::new(factory))),
            errors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetHandle> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_rows(&self, rows: &[Row]) -> Result<PushReport> {
        let result = self.lock().push_rows(rows);
        match &result {
            Ok(report) if report.reconstructed => {
                self.errors.resolve(&ErrorScope::Widget);
            }
            Ok(_) => {}
            Err(e) => {
                self.errors
                    .record(ErrorScope::Widget, ErrorSeverity::Error, e.to_error_info());
            }
        }
        result
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_ready()
    }

    pub fn state(&self) -> WidgetState {
        self.lock().state()
    }

    pub fn constructions(&self) -> u64 {
        self.lock().constructions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Grid whose `set_rows` can be switched off to mimic a mismatched
    /// library version.
    struct FakeGrid {
        rows: Mutex<Vec<Row>>,
        broken: AtomicBool,
        advertises: bool,
    }

    impl GridApi for FakeGrid {
        fn supports(&self, _op: GridOperation) -> bool {
            self.advertises
        }

        fn set_rows(&self, rows: &[Row]) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(DashError::widget_capability("set_rows"));
            }
            *self.rows.lock().unwrap() = rows.to_vec();
            Ok(())
        }
    }

    /// Factory following a script of outcomes, one per construction.
    struct ScriptedFactory {
        /// `Some(broken)` builds a grid, `None` fails construction
        script: Mutex<Vec<Option<bool>>>,
        built: Mutex<Vec<Arc<FakeGrid>>>,
        calls: AtomicU64,
    }

    impl ScriptedFactory {
        fn new(script: Vec<Option<bool>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                built: Mutex::new(Vec::new()),
                calls: AtomicU64::new(0),
            })
        }

        fn last(&self) -> Arc<FakeGrid> {
            Arc::clone(self.built.lock().unwrap().last().unwrap())
        }
    }

    impl GridFactory for ScriptedFactory {
        fn construct(&self) -> Result<Arc<dyn GridApi>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.is_empty() { Some(false) } else { script.remove(0) };
            match next {
                Some(broken) => {
                    let grid = Arc::new(FakeGrid {
                        rows: Mutex::new(Vec::new()),
                        broken: AtomicBool::new(broken),
                        advertises: true,
                    });
                    self.built.lock().unwrap().push(Arc::clone(&grid));
                    Ok(grid)
                }
                None => Err(DashError::WidgetConstruction {
                    message: "grid library not loaded".into(),
                }),
            }
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| serde_json::json!({ "id": i })).collect()
    }

    #[test]
    fn test_first_push_constructs_once() {
        let factory = ScriptedFactory::new(vec![]);
        let mut handle = WidgetHandle::new(factory.clone());
        assert_eq!(handle.state(), WidgetState::Uninitialized);

        let report = handle.push_rows(&rows(3)).unwrap();
        assert!(report.reconstructed);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), WidgetState::Ready);
        assert_eq!(factory.last().rows.lock().unwrap().len(), 3);

        let report = handle.push_rows(&rows(1)).unwrap();
        assert!(!report.reconstructed);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broken_reference_heals_and_retries() {
        let factory = ScriptedFactory::new(vec![Some(false), Some(false)]);
        let mut handle = WidgetHandle::new(factory.clone());
        handle.push_rows(&rows(1)).unwrap();

        factory.last().broken.store(true, Ordering::SeqCst);
        let report = handle.push_rows(&rows(4)).unwrap();

        assert!(report.reconstructed);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), WidgetState::Ready);
        assert_eq!(*factory.last().rows.lock().unwrap(), rows(4));
    }

    #[test]
    fn test_failed_reconstruction_stays_stale() {
        let factory = ScriptedFactory::new(vec![None]);
        let mut handle = WidgetHandle::new(factory.clone());

        let err = handle.push_rows(&rows(2)).unwrap_err();
        assert!(err.is_widget_error());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), WidgetState::Stale);
    }

    #[test]
    fn test_retry_is_bounded_to_one() {
        // Every constructed grid is broken: one rebuild, one retry, then give up.
        let factory = ScriptedFactory::new(vec![Some(false), Some(true), Some(true)]);
        let mut handle = WidgetHandle::new(factory.clone());
        handle.push_rows(&rows(1)).unwrap();
        factory.last().broken.store(true, Ordering::SeqCst);

        assert!(handle.push_rows(&rows(2)).is_err());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), WidgetState::Stale);
    }

    #[test]
    fn test_construction_without_capability_is_rejected() {
        struct HollowFactory;
        impl GridFactory for HollowFactory {
            fn construct(&self) -> Result<Arc<dyn GridApi>> {
                Ok(Arc::new(FakeGrid {
                    rows: Mutex::new(Vec::new()),
                    broken: AtomicBool::new(false),
                    advertises: false,
                }))
            }
        }

        let mut handle = WidgetHandle::new(Arc::new(HollowFactory));
        assert!(matches!(
            handle.push_rows(&rows(1)),
            Err(DashError::WidgetConstruction { .. })
        ));
        assert!(!handle.is_ready());
        assert_eq!(handle.constructions(), 1);
    }

    #[test]
    fn test_shared_widget_reports_to_error_area() {
        let errors = ErrorArea::new();
        let shared = SharedWidget::new(
            ScriptedFactory::new(vec![None, Some(false)]),
            errors.clone(),
        );

        assert!(shared.push_rows(&rows(1)).is_err());
        assert!(errors.is_degraded(&ErrorScope::Widget));

        shared.push_rows(&rows(1)).unwrap();
        assert!(!errors.is_degraded(&ErrorScope::Widget));
        assert_eq!(shared.state(), WidgetState::Ready);
        assert_eq!(shared.constructions(), 2);
    }
}
