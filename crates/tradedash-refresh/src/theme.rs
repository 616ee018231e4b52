//! Process-wide theme change broadcast.
//!
//! One writer (the theme toggle) and any number of listeners. Listeners are
//! invoked synchronously in registration order. Theme-sensitive regions
//! subscribe at page construction and re-run their own refresh on notice
//! instead of restyling in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use tracing::debug;
use tradedash_core::ThemeId;

/// Listener callback.
pub type ThemeListener = Arc<dyn Fn(&ThemeId) + Send + Sync>;

/// Handle returned by [`ThemeBroadcast::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Theme publish/subscribe channel.
pub struct ThemeBroadcast {
    current: RwLock<ThemeId>,
    listeners: Mutex<Vec<(SubscriptionId, ThemeListener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ThemeBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeBroadcast")
            .field("current", &self.current())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for ThemeBroadcast {
    fn default() -> Self {
        Self::new(ThemeId::default())
    }
}

impl ThemeBroadcast {
    pub fn new(initial: ThemeId) -> Self {
        Self {
            current: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The broadcast shared by every page of this process.
    pub fn global() -> Arc<ThemeBroadcast> {
        static GLOBAL: OnceLock<Arc<ThemeBroadcast>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ThemeBroadcast::default())))
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, ThemeListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently active theme.
    pub fn current(&self) -> ThemeId {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl Fn(&ThemeId) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        debug!(subscription = id.0, "theme listener registered");
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Make `theme` current and notify every listener in registration order.
    ///
    /// Returns the number of listeners notified. Listeners may subscribe or
    /// unsubscribe from inside the callback; changes apply to the next publish.
    pub fn publish(&self, theme: ThemeId) -> usize {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = theme.clone();

        let snapshot: Vec<ThemeListener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(%theme, listeners = snapshot.len(), "publishing theme change");
        for listener in &snapshot {
            listener(&theme);
        }
        snapshot.len()
    }
}
