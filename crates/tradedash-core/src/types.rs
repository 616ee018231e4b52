//! Shared type definitions used across TradeDash crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed JSON payload handed to a region's render callback.
pub type Payload = serde_json::Value;

/// One grid row. Pushes always replace the full row set.
pub type Row = serde_json::Value;

/// User-facing error shown inside a region.
///
/// `server_trace` carries the diagnostic text supplied by the backend
/// (e.g. a Python traceback). It is shown behind a "show details"
/// affordance, separate from `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Primary message
    pub message: String,
    /// Server-supplied diagnostic, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_trace: Option<String>,
}

impl ErrorInfo {
    /// Create an error without server diagnostics.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            server_trace: None,
        }
    }

    /// Create an error carrying a server trace.
    pub fn with_trace(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            server_trace: Some(trace.into()),
        }
    }

    /// Whether there is a details section to show.
    pub fn has_details(&self) -> bool {
        self.server_trace.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Per-region bookkeeping.
///
/// `loading` is true iff at least one fetch for the region is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionState {
    /// A fetch is in flight
    pub loading: bool,
    /// Error from the latest settled fetch
    pub last_error: Option<ErrorInfo>,
    /// When the region last rendered data
    pub last_success_at: Option<DateTime<Utc>>,
    /// Payload from the latest successful fetch
    pub last_payload: Option<Payload>,
}

impl RegionState {
    /// Create an empty (never loaded) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if data has been loaded at least once.
    pub fn is_loaded(&self) -> bool {
        self.last_success_at.is_some()
    }

    /// Check if the latest settled fetch failed.
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Opaque visual theme identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeId(String);

impl ThemeId {
    /// Create a theme id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The light theme.
    pub fn light() -> Self {
        Self::new("light")
    }

    /// The dark theme.
    pub fn dark() -> Self {
        Self::new("dark")
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThemeId {
    fn default() -> Self {
        Self::light()
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_details() {
        assert!(!ErrorInfo::new("boom").has_details());
        assert!(!ErrorInfo::with_trace("boom", "  ").has_details());
        assert!(ErrorInfo::with_trace("boom", "line 1").has_details());
    }

    #[test]
    fn test_error_info_serialization_skips_missing_trace() {
        let json = serde_json::to_string(&ErrorInfo::new("db down")).unwrap();
        assert_eq!(json, r#"{"message":"db down"}"#);
    }

    #[test]
    fn test_region_state_defaults() {
        let state = RegionState::new();
        assert!(!state.loading);
        assert!(!state.is_loaded());
        assert!(!state.has_error());
    }

    #[test]
    fn test_theme_id_roundtrip() {
        let theme: ThemeId = serde_json::from_str(r#""dark""#).unwrap();
        assert_eq!(theme, ThemeId::dark());
        assert_eq!(theme.to_string(), "dark");
    }
}
