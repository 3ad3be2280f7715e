//! Batch progress reporting.
//!
//! Reports observable progress while a batch of raw records is transformed,
//! so users of `ahx transform` / `ahx run` see how far along a large export
//! is and how many records were rejected. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.
//!
//! Reporters are injected into the transformer; nothing here is global.

use std::io::Write;

/// A single progress event for a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchProgressEvent {
    /// Batch accepted, `total` records to process.
    Started { total: u64 },
    /// `n` of `total` records processed, `skipped` of them rejected so far.
    Processed { n: u64, total: u64, skipped: u64 },
    /// Batch complete.
    Finished { succeeded: u64, skipped: u64 },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the batch transformer.
    fn report(&self, event: BatchProgressEvent);
}

/// How often, in records, `Processed` events are emitted.
pub const REPORT_EVERY: u64 = 500;

/// Human-friendly progress on stderr: "transform  1,500 / 12,000 records  (3 skipped)".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Started { total } => {
                format!("transform  {} records\n", format_number(*total))
            }
            BatchProgressEvent::Processed { n, total, skipped } => format!(
                "transform  {} / {} records  ({} skipped)\n",
                format_number(*n),
                format_number(*total),
                format_number(*skipped)
            ),
            BatchProgressEvent::Finished { succeeded, skipped } => format!(
                "transform  done: {} ok, {} skipped\n",
                format_number(*succeeded),
                format_number(*skipped)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            BatchProgressEvent::Processed { n, total, skipped } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "skipped": skipped
            }),
            BatchProgressEvent::Finished { succeeded, skipped } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "succeeded": succeeded,
                "skipped": skipped
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the transformer.
    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
