//! Progress reporting
//!
//! Messages are free-form text for display; each carries a [`Phase`] for
//! callers that want something structured. Any `FnMut(&str)` works as a sink.

use std::fmt;
use std::time::{Duration, Instant};

/// Stage of an export or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading store pages into the archive
    ExportRecords,
    /// Streaming media into the archive
    ExportMedia,
    /// Writing the manifest and finishing the file
    Finalize,
    /// Acquiring the ranch lock
    Lock,
    /// Verifying the archive
    Validate,
    /// Checking archive-internal consistency
    Consistency,
    /// Deciding the target identity of each animal
    IdentityAssignment,
    /// Deleting existing animals (replace mode)
    Delete,
    /// Writing records and media
    Apply,
    /// Rewriting parent links
    ReferenceRewrite,
    /// Finished
    Done,
}

impl Phase {
    /// Short name
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ExportRecords => "export-records",
            Phase::ExportMedia => "export-media",
            Phase::Finalize => "finalize",
            Phase::Lock => "lock",
            Phase::Validate => "validate",
            Phase::Consistency => "consistency",
            Phase::IdentityAssignment => "identity-assignment",
            Phase::Delete => "delete",
            Phase::Apply => "apply",
            Phase::ReferenceRewrite => "reference-rewrite",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress messages on the executing thread
pub trait ProgressSink {
    /// Human-readable message for `phase`
    fn report(&mut self, phase: Phase, message: &str);
}

impl<F: FnMut(&str)> ProgressSink for F {
    fn report(&mut self, _phase: Phase, message: &str) {
        self(message)
    }
}

/// Sink that drops every message
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _phase: Phase, _message: &str) {}
}

/// Throttles per-record progress and remembers the last message
pub(crate) struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    every_records: u64,
    interval: Duration,
    since_report: u64,
    last_report: Instant,
    last_message: Option<String>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, every_records: u64, interval: Duration) -> Self {
        Self {
            sink,
            every_records: every_records.max(1),
            interval,
            since_report: 0,
            last_report: Instant::now(),
            last_message: None,
        }
    }

    /// Unthrottled report, used once per phase
    pub(crate) fn phase(&mut self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        self.sink.report(phase, &message);
        self.since_report = 0;
        self.last_report = Instant::now();
        self.last_message = Some(message);
    }

    /// Count `n` processed records; reports only when a threshold passes
    pub(crate) fn advance(&mut self, phase: Phase, n: u64, message: impl FnOnce() -> String) {
        self.since_report += n;
        if self.since_report >= self.every_records || self.last_report.elapsed() >= self.interval
        {
            self.phase(phase, message());
        }
    }

    pub(crate) fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }
}
