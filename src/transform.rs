//! Batch transformation.
//!
//! Runs [`assemble::process_document`] over every record of a batch, merges
//! successes by external id (last write wins, first position kept) and
//! collects a dead letter for every rejection. A bad record never stops the
//! batch; only an input that is not a JSON array is refused outright.
//!
//! The pure functions ([`process_batch`], [`process_batch_parallel`],
//! [`process_input`]) have no side effects. [`BatchTransformer`] wraps them
//! with an injected dead-letter sink and progress reporter.

use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use crate::assemble::{self, Assembled};
use crate::dead_letter::{DeadLetterSink, NullDeadLetterSink};
use crate::models::{CanonicalDocument, DeadLetterRecord, ProcessingReport, RawRecord};
use crate::progress::{BatchProgressEvent, BatchProgressReporter, NoProgress, REPORT_EVERY};

/// Batch-level input failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("input must be a JSON array of records, got {0}")]
    NotASequence(&'static str),
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Documents keyed by external id, in first-insertion order.
    pub documents: IndexMap<String, CanonicalDocument>,
    /// One report per input record, in input order.
    pub reports: Vec<ProcessingReport>,
    /// One dead letter per rejected record, in input order.
    pub dead_letters: Vec<DeadLetterRecord>,
}

impl BatchOutcome {
    pub fn processed_count(&self) -> usize {
        self.documents.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.dead_letters.len()
    }

    /// Documents in output order.
    pub fn into_documents(self) -> Vec<CanonicalDocument> {
        self.documents.into_values().collect()
    }

    fn record(&mut self, raw: &RawRecord, assembled: Assembled) {
        let Assembled { document, report } = assembled;
        match document {
            Some(doc) => {
                self.documents.insert(doc.external_id().to_string(), doc);
            }
            None => self.dead_letters.push(DeadLetterRecord {
                id: report.id.clone(),
                reason: report.reason.clone(),
                raw_doc: raw.clone(),
            }),
        }
        self.reports.push(report);
    }
}

/// Process `raws` sequentially.
pub fn process_batch(raws: &[RawRecord]) -> BatchOutcome {
    process_batch_with(raws, assemble::process_document)
}

/// Process `raws` sequentially, assembling each record with `assemble`.
pub fn process_batch_with<F>(raws: &[RawRecord], assemble: F) -> BatchOutcome
where
    F: Fn(&RawRecord) -> Assembled,
{
    let mut outcome = BatchOutcome::default();
    for raw in raws {
        outcome.record(raw, assemble(raw));
    }
    outcome
}

/// Process `raws` on the rayon pool.
///
/// Records are assembled in parallel, then merged in input order, so the
/// result is identical to [`process_batch`].
pub fn process_batch_parallel(raws: &[RawRecord]) -> BatchOutcome {
    let assembled: Vec<Assembled> = raws.par_iter().map(assemble::process_document).collect();

    let mut outcome = BatchOutcome::default();
    for (raw, result) in raws.iter().zip(assembled) {
        outcome.record(raw, result);
    }
    outcome
}

/// Process a request body that should be a JSON array of records.
pub fn process_input(input: &Value) -> Result<BatchOutcome, InputError> {
    Ok(process_batch(records(input)?))
}

/// Borrow the records of `input`, refusing anything but a JSON array.
pub fn records(input: &Value) -> Result<&[RawRecord], InputError> {
    match input {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Null => Err(InputError::NotASequence("null")),
        Value::Bool(_) => Err(InputError::NotASequence("a boolean")),
        Value::Number(_) => Err(InputError::NotASequence("a number")),
        Value::String(_) => Err(InputError::NotASequence("a string")),
        Value::Object(_) => Err(InputError::NotASequence("an object")),
    }
}

/// Batch transformer with its collaborators.
///
/// Dead letters are appended once per batch by a single writer. Sink
/// failures are logged and do not affect the returned outcome.
pub struct BatchTransformer {
    sink: Arc<dyn DeadLetterSink>,
    progress: Arc<dyn BatchProgressReporter>,
    parallel: bool,
}

impl Default for BatchTransformer {
    fn default() -> Self {
        Self::new(Arc::new(NullDeadLetterSink))
    }
}

impl BatchTransformer {
    pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            sink,
            progress: Arc::new(NoProgress),
            parallel: false,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn BatchProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Assemble records on the rayon pool. Results are still merged in
    /// input order, and `Processed` progress events are emitted during that
    /// merge, once assembly has finished.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Transform `raws`, write dead letters and report progress.
    pub fn run(&self, raws: &[RawRecord]) -> BatchOutcome {
        let total = raws.len() as u64;
        self.progress.report(BatchProgressEvent::Started { total });

        let outcome = if self.parallel {
            let assembled: Vec<Assembled> =
                raws.par_iter().map(assemble::process_document).collect();
            self.merge(raws, assembled, total)
        } else {
            self.merge(raws, raws.iter().map(assemble::process_document), total)
        };

        if let Err(e) = self.sink.append(&outcome.dead_letters) {
            let error = format!("{e:#}");
            let count = outcome.dead_letters.len();
            warn!(%error, count, "failed to write dead letters");
        }

        let skipped = outcome.skipped_count() as u64;
        self.progress.report(BatchProgressEvent::Finished {
            succeeded: total - skipped,
            skipped,
        });
        info!(
            total,
            processed = outcome.processed_count(),
            skipped,
            "batch transformed"
        );
        outcome
    }

    /// Transform a request body; see [`process_input`].
    pub fn run_input(&self, input: &Value) -> Result<BatchOutcome, InputError> {
        Ok(self.run(records(input)?))
    }

    /// Fold assembled results into an outcome in input order, reporting
    /// progress every [`REPORT_EVERY`] records.
    fn merge<I>(&self, raws: &[RawRecord], assembled: I, total: u64) -> BatchOutcome
    where
        I: IntoIterator<Item = Assembled>,
    {
        let mut outcome = BatchOutcome::default();
        for (i, (raw, result)) in raws.iter().zip(assembled).enumerate() {
            outcome.record(raw, result);
            let n = i as u64 + 1;
            if n % REPORT_EVERY == 0 && n < total {
                self.progress.report(BatchProgressEvent::Processed {
                    n,
                    total,
                    skipped: outcome.skipped_count() as u64,
                });
            }
        }
        outcome
    }
}
