//! Error types for TradeDash operations.
//!
//! This module defines [`DashError`], the error enum shared by every page
//! component. Errors are designed for visibility: each one can be turned into
//! an [`ErrorInfo`] that a region renders inline, with the server-supplied
//! diagnostic kept apart from the primary message.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ErrorInfo;

/// Result type alias using [`DashError`].
pub type Result<T> = std::result::Result<T, DashError>;

/// Comprehensive error type for all TradeDash operations.
#[derive(Debug, Error)]
pub enum DashError {
    // =========================================================================
    // Transport / HTTP Errors
    // =========================================================================
    /// No response was received (connection refused, DNS, timeout)
    #[error("Network error: {message}")]
    Transport { message: String },

    /// Non-success status with a structured error body
    #[error("{}", .info.message)]
    Http { status: u16, info: ErrorInfo },

    /// Non-success status whose body could not be parsed
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16 },

    /// Success status but the body is missing fields or has the wrong shape
    #[error("Malformed response from {context}: {message}")]
    MalformedBody { context: String, message: String },

    /// The backend answered 200 but reported an error in the payload
    #[error("{}", .info.message)]
    Backend { info: ErrorInfo },

    // =========================================================================
    // Widget Errors
    // =========================================================================
    /// The external widget reference lacks an expected operation
    #[error("Widget operation unavailable: {operation}")]
    WidgetCapability { operation: String },

    /// Constructing the external widget failed
    #[error("Failed to construct widget: {message}")]
    WidgetConstruction { message: String },

    // =========================================================================
    // Region Errors
    // =========================================================================
    /// No region with this id is declared on the page
    #[error("Unknown region: {region_id}")]
    UnknownRegion { region_id: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file is not valid YAML for the config schema
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration values are inconsistent
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in TradeDash)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DashError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a malformed-body error
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedBody {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a widget capability error
    pub fn widget_capability(operation: impl Into<String>) -> Self {
        Self::WidgetCapability {
            operation: operation.into(),
        }
    }

    /// Create an unknown region error
    pub fn unknown_region(region_id: impl Into<String>) -> Self {
        Self::UnknownRegion {
            region_id: region_id.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if polling or refreshing again may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Backend { .. } => true,
            Self::Http { status, .. } | Self::HttpStatus { status } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Returns true if no response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true if this error came from the external widget.
    pub fn is_widget_error(&self) -> bool {
        matches!(
            self,
            Self::WidgetCapability { .. } | Self::WidgetConstruction { .. }
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }

    /// Convert into the user-facing error shown inside a region.
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            Self::Http { info, .. } | Self::Backend { info } => info.clone(),
            other => ErrorInfo::new(other.to_string()),
        }
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Transport { .. } => Some("Check that the dashboard backend is running"),
            Self::HttpStatus { status } | Self::Http { status, .. } if *status >= 500 => {
                Some("The server failed to handle the request - see details")
            }
            Self::WidgetConstruction { .. } => Some("Reload the page to rebuild the grid"),
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in ~/.tradedash/config.yaml"),
            _ => None,
        }
    }
}
