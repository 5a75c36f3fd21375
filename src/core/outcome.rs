//! Purpose: Immutable summary of one bulk-write round trip.
//! Exports: `BulkOutcome`, `PartialOutcome`, `BulkStatus`, `RoundStats`, `FailureRecord`, `HTTP_OK`.
//! Role: Sole per-round truth consumed by retry drivers and reporting.
//! Invariants: A complete outcome carries no failures; a partial one carries at least one.
//! Invariants: Failures keep discovery order; nothing is reordered, merged, or filtered.
//! Invariants: Failure positions are unique and inside the round's document count.
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::core::error::{Error, ErrorKind};

pub const HTTP_OK: u16 = 200;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BulkStatus {
    /// Every document in the round was accepted.
    Complete,
    /// The round finished but some documents were rejected.
    Partial,
}

impl BulkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkStatus::Complete => "complete",
            BulkStatus::Partial => "partial",
        }
    }
}

/// Round metadata, carried verbatim from the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RoundStats {
    pub http_status: u16,
    /// Client-measured time; advisory, so negative values are kept as-is.
    pub elapsed_ms: i64,
    pub total_documents: usize,
}

/// One rejected document.
///
/// The payload is a `Bytes` handle. When it was sliced from a round buffer it
/// shares that buffer's storage; `Bytes` is immutable, so the bytes stay
/// valid for as long as the record lives regardless of what the transport
/// does with its own handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailureRecord {
    original_position: usize,
    current_position: usize,
    payload: Bytes,
    document_status: u16,
    error_message: String,
}

impl FailureRecord {
    pub fn new(
        original_position: usize,
        current_position: usize,
        payload: Bytes,
        document_status: u16,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            original_position,
            current_position,
            payload,
            document_status,
            error_message: error_message.into(),
        }
    }

    /// Builds a record from borrowed bytes; the payload is copied.
    pub fn from_slice(
        original_position: usize,
        current_position: usize,
        payload: &[u8],
        document_status: u16,
        error_message: impl Into<String>,
    ) -> Self {
        Self::new(
            original_position,
            current_position,
            Bytes::copy_from_slice(payload),
            document_status,
            error_message,
        )
    }

    /// Position in the caller's first, never-retried submission.
    pub fn original_position(&self) -> usize {
        self.original_position
    }

    /// Position inside the buffer sent in this round.
    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn document_status(&self) -> u16 {
        self.document_status
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }
}

/// Data of a partial outcome. Only `BulkOutcome::partial` can build one, so the
/// failure list is always validated and non-empty.
///
/// ```compile_fail
/// use bulkwrite::api::{BulkOutcome, PartialOutcome, RoundStats};
///
/// let stats = RoundStats { http_status: 200, elapsed_ms: 1, total_documents: 3 };
/// let _ = BulkOutcome::Partial(PartialOutcome { stats, errors: Vec::new().into() });
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartialOutcome {
    stats: RoundStats,
    errors: Arc<[FailureRecord]>,
}

impl PartialOutcome {
    pub fn stats(&self) -> &RoundStats {
        &self.stats
    }

    /// Never empty.
    pub fn errors(&self) -> &[FailureRecord] {
        &self.errors
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BulkOutcome {
    Complete(RoundStats),
    Partial(PartialOutcome),
}

impl BulkOutcome {
    /// Outcome for a round with nothing to send.
    pub fn complete() -> Self {
        Self::complete_with(HTTP_OK, 0, 0)
    }

    /// Outcome for a round in which the caller saw every document succeed.
    pub fn complete_with(http_status: u16, elapsed_ms: i64, total_documents: usize) -> Self {
        Self::Complete(RoundStats {
            http_status,
            elapsed_ms,
            total_documents,
        })
    }

    /// Outcome for a round with rejected documents.
    ///
    /// The failure list is moved in without reordering. Construction fails with
    /// `ErrorKind::Usage` when the list is empty, longer than
    /// `total_documents`, points outside the round, or names the same
    /// document twice.
    pub fn partial(
        http_status: u16,
        elapsed_ms: i64,
        total_documents: usize,
        errors: Vec<FailureRecord>,
    ) -> Result<Self, Error> {
        validate_failures(total_documents, &errors)?;
        Ok(Self::Partial(PartialOutcome {
            stats: RoundStats {
                http_status,
                elapsed_ms,
                total_documents,
            },
            errors: Arc::from(errors),
        }))
    }

    pub fn stats(&self) -> &RoundStats {
        match self {
            BulkOutcome::Complete(stats) => stats,
            BulkOutcome::Partial(partial) => partial.stats(),
        }
    }

    pub fn status(&self) -> BulkStatus {
        match self {
            BulkOutcome::Complete(_) => BulkStatus::Complete,
            BulkOutcome::Partial(_) => BulkStatus::Partial,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, BulkOutcome::Complete(_))
    }

    pub fn http_status(&self) -> u16 {
        self.stats().http_status
    }

    /// Client time spent on the round, in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        self.stats().elapsed_ms
    }

    /// Client time spent on the round, clamped at zero.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms().max(0) as u64)
    }

    pub fn total_documents(&self) -> usize {
        self.stats().total_documents
    }

    pub fn errors(&self) -> &[FailureRecord] {
        match self {
            BulkOutcome::Complete(_) => &[],
            BulkOutcome::Partial(partial) => partial.errors(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors().len()
    }

    pub fn success_count(&self) -> usize {
        self.total_documents().saturating_sub(self.error_count())
    }
}

impl Default for BulkOutcome {
    fn default() -> Self {
        Self::complete()
    }
}

impl fmt::Display for BulkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} documents written",
            self.status().as_str(),
            self.success_count(),
            self.total_documents()
        )?;
        if !self.is_complete() {
            write!(f, ", {} failed", self.error_count())?;
        }
        write!(f, " (http {}, {}ms)", self.http_status(), self.elapsed_ms())
    }
}

fn validate_failures(total_documents: usize, errors: &[FailureRecord]) -> Result<(), Error> {
    if errors.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("partial outcome requires at least one failure")
            .with_hint("Use BulkOutcome::complete_with when every document succeeded."));
    }
    if errors.len() > total_documents {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "{} failures reported for a round of {total_documents} documents",
            errors.len()
        )));
    }

    let mut current = HashSet::with_capacity(errors.len());
    let mut original = HashSet::with_capacity(errors.len());
    for record in errors {
        if record.current_position >= total_documents {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("current position outside the round")
                .with_position(record.current_position));
        }
        if !current.insert(record.current_position) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("duplicate current position")
                .with_position(record.current_position));
        }
        if !original.insert(record.original_position) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("duplicate original position")
                .with_position(record.original_position));
        }
    }
    Ok(())
}
