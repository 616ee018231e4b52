//! # tradedash-core
//!
//! Core types, errors, and utilities for the TradeDash dashboard.
//!
//! This crate provides:
//! - [`DashError`] - Error taxonomy for region fetches, polling and widgets
//! - [`logging`] - Tracing setup
//! - [`config`] - YAML configuration
//! - [`types`] - Shared type definitions ([`ErrorInfo`], [`RegionState`], [`ThemeId`])
//!
//! ## Example
//!
//! ```no_run
//! use tradedash_core::{DashboardConfig, logging};
//!
//! fn main() -> tradedash_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!     let config = DashboardConfig::load_default()?;
//!     tracing::info!(base_url = %config.base_url, "config ready");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{DashboardConfig, PollerConfig};
pub use error::{DashError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{ErrorInfo, Payload, RegionState, Row, ThemeId};
