//! Batching and orchestration
//!
//! Pulls unprocessed capture events from the crawl collaborator, partitions
//! them into fixed-size batches, and dispatches batches to a bounded worker
//! pool. Each worker runs one batch end to end: decode, normalize,
//! decompose, validate, sink. Workers share nothing but the sink, whose
//! operations are safe under concurrent calls.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use ingatlan_common::types::{CaptureEvent, HandlerKind};
use ingatlan_common::{IngestError, Result};

use crate::config::{FailurePolicy, PipelineConfig};
use crate::decompose::{decompose_batch, decompose_locations};
use crate::document::{self, Document};
use crate::normalize::{normalize_keys, normalize_subject};
use crate::schema::{Registry, Row, LOCATION, REAL_ESTATE, REAL_ESTATE_RECORD};
use crate::sink::TableSink;
use crate::validate::validate_batch;

/// The crawl collaborator's face toward this pipeline.
///
/// The sequence is monotonic inside one logical run (no event returned
/// twice) and resumable across runs; both are the collaborator's promise,
/// not enforced here.
pub trait EventSource: Send + Sync {
    fn unprocessed_events(&self, kind: HandlerKind) -> Result<Vec<CaptureEvent>>;
}

/// Outcome of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: HandlerKind,
    pub batch_index: usize,
    /// Events handed to the worker
    pub events: usize,
    /// Malformed captures skipped inside the batch
    pub skipped: usize,
    /// Entity tables the batch committed rows to, in commit order
    pub tables_written: Vec<&'static str>,
    /// Present when the batch failed under collect-and-continue
    pub error: Option<String>,
}

/// What a worker hands back for a batch that ran to completion.
#[derive(Debug, Default)]
struct BatchOutcome {
    skipped: usize,
    tables_written: Vec<&'static str>,
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub batches: Vec<BatchReport>,
}

impl RunReport {
    pub fn skipped_total(&self) -> usize {
        self.batches.iter().map(|b| b.skipped).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.error.is_some()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_batches() == 0
    }
}

/// One-run orchestrator over the two capture streams.
pub struct Orchestrator {
    registry: Arc<Registry>,
    sink: Arc<dyn TableSink>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(registry: Registry, sink: Arc<dyn TableSink>, config: PipelineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            sink,
            config,
        }
    }

    /// Process everything the source has for both handler kinds.
    ///
    /// Under fail-fast (the default) the first batch error aborts the run
    /// and propagates; committed batches stay committed, there is no
    /// cross-batch rollback. Under collect-and-continue, batch errors are
    /// logged and reported, except schema drift, which aborts regardless.
    pub async fn run(&self, source: &dyn EventSource) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            workers = self.config.pool.worker_count(),
            batch_size = self.config.effective_batch_size(),
            "starting normalization run"
        );

        let mut batches = Vec::new();
        for kind in [HandlerKind::Detail, HandlerKind::Listing] {
            let events = source.unprocessed_events(kind)?;
            info!(run_id = %run_id, kind = %kind, events = events.len(), "pulled capture events");
            batches.extend(self.run_stream(kind, events).await?);
        }

        let report = RunReport { run_id, batches };
        info!(
            run_id = %run_id,
            batches = report.batches.len(),
            failed = report.failed_batches(),
            skipped = report.skipped_total(),
            "run finished"
        );
        Ok(report)
    }

    async fn run_stream(
        &self,
        kind: HandlerKind,
        events: Vec<CaptureEvent>,
    ) -> Result<Vec<BatchReport>> {
        let batch_size = self.config.effective_batch_size();
        let semaphore = Arc::new(Semaphore::new(self.config.pool.worker_count()));
        let mut tasks = JoinSet::new();

        let mut chunks = Vec::new();
        let mut events = events;
        while !events.is_empty() {
            let rest = events.split_off(events.len().min(batch_size));
            chunks.push(events);
            events = rest;
        }

        for (batch_index, batch) in chunks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let sink = Arc::clone(&self.sink);

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => match kind {
                        HandlerKind::Detail => {
                            process_detail_batch(&registry, sink.as_ref(), &batch)
                        }
                        HandlerKind::Listing => {
                            process_listing_batch(&registry, sink.as_ref(), &batch)
                        }
                    },
                    Err(_) => Err(IngestError::Storage("worker pool closed".to_string())),
                };
                (batch_index, batch.len(), outcome)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (batch_index, events, outcome) = joined
                .map_err(|e| IngestError::Storage(format!("worker task failed: {e}")))?;
            match outcome {
                Ok(outcome) => reports.push(BatchReport {
                    kind,
                    batch_index,
                    events,
                    skipped: outcome.skipped,
                    tables_written: outcome.tables_written,
                    error: None,
                }),
                Err(err) => {
                    error!(kind = %kind, batch_index, error = %err, "batch failed");
                    if self.config.failure_policy == FailurePolicy::FailFast || err.is_fatal() {
                        tasks.abort_all();
                        return Err(err.in_batch(kind.as_str(), batch_index));
                    }
                    reports.push(BatchReport {
                        kind,
                        batch_index,
                        events,
                        skipped: 0,
                        tables_written: Vec::new(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        reports.sort_by_key(|r| r.batch_index);
        Ok(reports)
    }
}

/// Detail batch: subjects, their children, locations, plus the detail-side
/// history stamp derived from the capture url and timestamp.
fn process_detail_batch(
    registry: &Registry,
    sink: &dyn TableSink,
    events: &[CaptureEvent],
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    let mut subjects: Vec<Row> = Vec::new();
    let mut locations: Vec<Row> = Vec::new();
    let mut history: Vec<Row> = Vec::new();

    for event in events {
        let detail = match document::decode(event) {
            Ok(Document::Detail(detail)) => detail,
            Ok(Document::Listing(_)) => {
                warn!(url = %event.url, "listing document in detail stream, skipping");
                outcome.skipped += 1;
                continue;
            }
            Err(err @ IngestError::MalformedDocument { .. }) => {
                warn!(url = %event.url, error = %err, "skipping malformed capture");
                outcome.skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };

        let property_id = match document::property_id_from_url(event) {
            Ok(id) => id,
            Err(err) => {
                warn!(url = %event.url, error = %err, "skipping capture without subject id");
                outcome.skipped += 1;
                continue;
            }
        };

        history.push(history_stub(property_id, event));
        subjects.push(normalize_subject(&detail.listing));
        locations.extend(detail.locations);
    }

    // the timestamp stamp goes first, as a capture fact independent of
    // whether decomposition of the same batch later fails
    let record_schema = registry.get(REAL_ESTATE_RECORD)?;
    let stamps = validate_batch(record_schema, history)?;
    if !stamps.is_empty() {
        sink.append(record_schema, stamps)?;
        outcome.tables_written.push(REAL_ESTATE_RECORD);
    }

    let decomposition = decompose_batch(subjects);

    for (entity, rows) in decomposition.children {
        let schema = registry.get(entity)?;
        let validated = validate_batch(schema, rows)?;
        sink.replace(schema, validated)?;
        outcome.tables_written.push(entity);
    }

    let subject_schema = registry.get(REAL_ESTATE)?;
    let validated = validate_batch(subject_schema, decomposition.parents)?;
    if !validated.is_empty() {
        sink.replace(subject_schema, validated)?;
        outcome.tables_written.push(REAL_ESTATE);
    }

    if !locations.is_empty() {
        let location_schema = registry.get(LOCATION)?;
        let rows = decompose_locations(&locations);
        sink.replace(location_schema, validate_batch(location_schema, rows)?)?;
        outcome.tables_written.push(LOCATION);
    }

    Ok(outcome)
}

/// Listing batch: one history record per card, stamped with the capture
/// time, appended and never updated.
fn process_listing_batch(
    registry: &Registry,
    sink: &dyn TableSink,
    events: &[CaptureEvent],
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    let mut history: Vec<Row> = Vec::new();

    for event in events {
        let listing = match document::decode(event) {
            Ok(Document::Listing(listing)) => listing,
            Ok(Document::Detail(_)) => {
                warn!(url = %event.url, "detail document in listing stream, skipping");
                outcome.skipped += 1;
                continue;
            }
            Err(err @ IngestError::MalformedDocument { .. }) => {
                warn!(url = %event.url, error = %err, "skipping malformed capture");
                outcome.skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };

        let recorded = recorded_value(event);
        for card in listing.cards {
            let mut row = normalize_keys(&card);
            let Some(id) = row.remove("id").filter(|v| !v.is_null()) else {
                warn!(url = %event.url, "listing card without id, skipping");
                outcome.skipped += 1;
                continue;
            };
            row.insert("property_id".to_string(), id);
            row.insert("recorded".to_string(), recorded.clone());
            history.push(row);
        }
    }

    let schema = registry.get(REAL_ESTATE_RECORD)?;
    let validated = validate_batch(schema, history)?;
    if !validated.is_empty() {
        sink.append(schema, validated)?;
        outcome.tables_written.push(REAL_ESTATE_RECORD);
    }
    Ok(outcome)
}

fn history_stub(property_id: i64, event: &CaptureEvent) -> Row {
    let mut row = Row::new();
    row.insert("property_id".to_string(), Value::from(property_id));
    row.insert("recorded".to_string(), recorded_value(event));
    row
}

fn recorded_value(event: &CaptureEvent) -> Value {
    Value::String(event.recorded_at().naive_utc().to_string())
}
