//! Document assembly: one raw record in, one canonical document (or a
//! rejection) and one audit report out.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. the record must be a JSON object
//! 2. `_id` must be present
//! 3. a URL must resolve
//! 4. the text body must be non-empty
//! 5. optional fields are extracted (their absence is never a failure)
//! 6. the assembled document must pass [`crate::schema`]
//!
//! Panics raised while handling a record are caught here and reported as
//! [`Rejection::Crash`], so a single bad record can never take down a batch.
//! The default panic hook stays installed, so each crash also prints the
//! usual `thread ... panicked at` line on stderr.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::extract;
use crate::models::{CanonicalDocument, CanonicalMetadata, ProcessingReport, RawRecord};
use crate::schema::SchemaError;

/// Id used in reports for records that carry no usable identifier.
pub const UNKNOWN_ID: &str = "unknown";

/// Why a record did not produce a document. The `Display` form is the
/// `reason` string written to reports and dead letters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Invalid document type")]
    InvalidType,
    #[error("Missing ID")]
    MissingId,
    #[error("Missing URL")]
    MissingUrl,
    #[error("Missing Text")]
    MissingText,
    #[error("Schema validation failed")]
    Schema(#[source] SchemaError),
    #[error("Crash: {0}")]
    Crash(String),
}

/// Result of assembling one record.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub document: Option<CanonicalDocument>,
    pub report: ProcessingReport,
}

/// Assemble `raw` into a canonical document.
///
/// Never panics; see [`try_assemble`] for the underlying checks.
pub fn process_document(raw: &RawRecord) -> Assembled {
    guarded(raw, try_assemble)
}

/// Run `assemble` on `raw` behind the record-boundary panic guard and
/// build the report.
///
/// A panic inside `assemble` becomes [`Rejection::Crash`].
pub fn guarded<F>(raw: &RawRecord, assemble: F) -> Assembled
where
    F: FnOnce(&RawRecord) -> Result<CanonicalDocument, Rejection>,
{
    let id = report_id(raw);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| assemble(raw)))
        .unwrap_or_else(|payload| Err(Rejection::Crash(panic_message(payload.as_ref()))));

    match outcome {
        Ok(document) => Assembled {
            report: ProcessingReport::success(document.external_id()),
            document: Some(document),
        },
        Err(rejection) => {
            match &rejection {
                Rejection::Schema(err) => debug!(id = %id, error = %err, "schema validation failed"),
                other => debug!(id = %id, reason = %other, "record rejected"),
            }
            Assembled {
                document: None,
                report: ProcessingReport::skipped(id, rejection.to_string()),
            }
        }
    }
}

/// The checks behind [`process_document`], without the panic guard.
pub fn try_assemble(raw: &RawRecord) -> Result<CanonicalDocument, Rejection> {
    if !raw.is_object() {
        return Err(Rejection::InvalidType);
    }
    let external_id = extract::external_id(raw).ok_or(Rejection::MissingId)?;
    let url = extract::url(raw).ok_or(Rejection::MissingUrl)?;
    let text = extract::text(raw).ok_or(Rejection::MissingText)?;

    let metadata = CanonicalMetadata {
        title: extract::title(raw),
        url,
        external_id,
        publish_date: extract::publish_date(raw),
        first_publish_date: extract::first_publish_date(raw),
        datetime: extract::datetime(raw),
        website: extract::website(raw),
        sections: extract::sections(raw),
        categories: extract::categories(raw),
        tags: extract::tags(raw),
        thumb: extract::thumb(raw),
    };

    CanonicalDocument::new(text, metadata).map_err(Rejection::Schema)
}

/// Id to report for `raw`: the stringified `_id` when there is one, else
/// [`UNKNOWN_ID`].
pub fn report_id(raw: &RawRecord) -> String {
    extract::external_id(raw).unwrap_or_else(|| UNKNOWN_ID.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
