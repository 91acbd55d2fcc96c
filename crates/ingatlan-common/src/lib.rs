//! Ingatlan Common Library
//!
//! Shared types, logging, and error handling for the ingatlan data pipeline.
//!
//! # Overview
//!
//! This crate provides common functionality used across the workspace:
//!
//! - **Error Handling**: The pipeline error taxonomy and result type
//! - **Logging**: Centralized tracing setup
//! - **Types**: Capture events and handler kinds shared with the crawl layer
//!
//! # Example
//!
//! ```no_run
//! use ingatlan_common::{IngestError, Result};
//! use ingatlan_common::types::{CaptureEvent, HandlerKind};
//!
//! fn describe(event: &CaptureEvent) -> Result<String> {
//!     Ok(format!("{} captured at {}", event.url, event.timestamp))
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{IngestError, Result};
