//! Ingatlan Ingest Library
//!
//! Normalizes raw capture events from the crawl layer into a fixed set of
//! relational entity tables. One detail capture decomposes into the current
//! subject state plus its child entities; one listing capture decomposes
//! into append-only history records.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ingatlan_ingest::config::PipelineConfig;
//! use ingatlan_ingest::pipeline::{EventSource, Orchestrator};
//! use ingatlan_ingest::schema::Registry;
//! use ingatlan_ingest::sink::MemorySink;
//!
//! # async fn run(source: &dyn EventSource) -> ingatlan_common::Result<()> {
//! let sink = Arc::new(MemorySink::new());
//! let orchestrator = Orchestrator::new(Registry::standard(), sink, PipelineConfig::new());
//! let report = orchestrator.run(source).await?;
//! println!("skipped {} malformed captures", report.skipped_total());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decompose;
pub mod document;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod validate;
