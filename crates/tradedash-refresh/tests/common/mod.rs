//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tradedash_core::{DashError, ErrorInfo, Payload, Result};
use tradedash_refresh::{
    DashboardClient, GridApi, GridFactory, MemoryGridFactory, PageSession, RenderSink,
    ThemeBroadcast,
};

/// One call into the render sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Rendered(String, Payload),
    RegionError(String, ErrorInfo),
    Banner(ErrorInfo),
    BannerCleared,
    Notice(String, String),
}

/// Sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn rendered(&self, region_id: &str) -> Vec<Payload> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Rendered(id, payload) if id == region_id => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, region_id: &str) -> Vec<ErrorInfo> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::RegionError(id, info) if id == region_id => Some(info),
                _ => None,
            })
            .collect()
    }

    pub fn banners(&self) -> Vec<ErrorInfo> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Banner(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Notice(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl RenderSink for RecordingSink {
    fn render_region(&self, region_id: &str, payload: &Payload) {
        self.push(SinkEvent::Rendered(region_id.to_string(), payload.clone()));
    }

    fn render_region_error(&self, region_id: &str, error: &ErrorInfo) {
        self.push(SinkEvent::RegionError(region_id.to_string(), error.clone()));
    }

    fn show_banner(&self, error: &ErrorInfo) {
        self.push(SinkEvent::Banner(error.clone()));
    }

    fn clear_banner(&self) {
        self.push(SinkEvent::BannerCleared);
    }

    fn show_notice(&self, region_id: &str, message: &str) {
        self.push(SinkEvent::Notice(region_id.to_string(), message.to_string()));
    }
}

pub fn client(base_url: &str) -> Arc<DashboardClient> {
    Arc::new(DashboardClient::new(base_url, Duration::from_secs(5)).unwrap())
}

pub fn session(name: &str) -> (Arc<PageSession>, Arc<MemoryGridFactory>) {
    let factory = Arc::new(MemoryGridFactory::new());
    let session = Arc::new(PageSession::new(
        name,
        Arc::new(ThemeBroadcast::default()),
        factory.clone(),
    ));
    (session, factory)
}

/// Grid factory that never produces a grid.
#[derive(Debug, Default)]
pub struct UnavailableGridFactory;

impl GridFactory for UnavailableGridFactory {
    fn construct(&self) -> Result<Arc<dyn GridApi>> {
        Err(DashError::WidgetConstruction {
            message: "grid factory unavailable".into(),
        })
    }
}

pub fn session_with_grids(name: &str, factory: Arc<dyn GridFactory>) -> Arc<PageSession> {
    Arc::new(PageSession::new(
        name,
        Arc::new(ThemeBroadcast::default()),
        factory,
    ))
}
