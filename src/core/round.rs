// Immutable per-round send buffer that remembers each document's original position.
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::error::{Error, ErrorKind};
use crate::core::outcome::{BulkOutcome, FailureRecord};

#[derive(Clone, Debug, Eq, PartialEq)]
struct Entry {
    original_position: usize,
    range: Range<usize>,
}

/// Documents sent together in one round, stored back to back in one `Bytes`.
///
/// Entries are indexed by current position. Retry buffers are compacted
/// copies that keep every document's original position.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RoundBuffer {
    data: Bytes,
    entries: Vec<Entry>,
}

/// Failure reported by a decoder, addressed by current position.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentFailure {
    position: usize,
    status: u16,
    message: String,
}

impl DocumentFailure {
    pub fn new(position: usize, status: u16, message: impl Into<String>) -> Self {
        Self {
            position,
            status,
            message: message.into(),
        }
    }

    /// Current position of the rejected document.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl RoundBuffer {
    /// First-round buffer; original positions follow submission order.
    pub fn from_documents<I, D>(documents: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        Self::assemble(documents.into_iter().enumerate())
    }

    fn assemble<I, D>(parts: I) -> Self
    where
        I: IntoIterator<Item = (usize, D)>,
        D: AsRef<[u8]>,
    {
        let mut data = BytesMut::new();
        let mut entries = Vec::new();
        for (original_position, doc) in parts {
            let start = data.len();
            data.put_slice(doc.as_ref());
            entries.push(Entry {
                original_position,
                range: start..data.len(),
            });
        }
        Self {
            data: data.freeze(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The exact bytes a transport would send for this round.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    /// Zero-copy view of the document at `current`.
    pub fn document(&self, current: usize) -> Option<Bytes> {
        self.entries
            .get(current)
            .map(|entry| self.data.slice(entry.range.clone()))
    }

    pub fn original_position(&self, current: usize) -> Option<usize> {
        self.entries.get(current).map(|entry| entry.original_position)
    }

    /// Original positions in current-position order.
    pub fn original_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|entry| entry.original_position)
    }

    /// Builds a failure record for the document at `current`.
    pub fn failure(
        &self,
        current: usize,
        status: u16,
        message: impl Into<String>,
    ) -> Result<FailureRecord, Error> {
        let entry = self.entries.get(current).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("current position outside the round buffer")
                .with_position(current)
        })?;
        Ok(FailureRecord::new(
            entry.original_position,
            current,
            self.data.slice(entry.range.clone()),
            status,
            message,
        ))
    }

    /// Decodes per-document failures into an outcome for this round.
    ///
    /// No failures means a complete outcome covering every document.
    pub fn outcome(
        &self,
        http_status: u16,
        elapsed_ms: i64,
        failures: Vec<DocumentFailure>,
    ) -> Result<BulkOutcome, Error> {
        if failures.is_empty() {
            return Ok(BulkOutcome::complete_with(
                http_status,
                elapsed_ms,
                self.len(),
            ));
        }
        let errors = failures
            .into_iter()
            .map(|failure| self.failure(failure.position, failure.status, failure.message))
            .collect::<Result<Vec<_>, _>>()?;
        BulkOutcome::partial(http_status, elapsed_ms, self.len(), errors)
    }

    /// Compacts the documents `outcome` reports as failed into the next round's buffer.
    ///
    /// Failed documents keep their relative order and original positions.
    pub fn retry_buffer(&self, outcome: &BulkOutcome) -> Result<RoundBuffer, Error> {
        self.retry_buffer_where(outcome, |_| true)
    }

    /// Like `retry_buffer`, keeping only failures accepted by `keep`.
    ///
    /// Every failure is still checked against this buffer, kept or not.
    pub fn retry_buffer_where<F>(
        &self,
        outcome: &BulkOutcome,
        keep: F,
    ) -> Result<RoundBuffer, Error>
    where
        F: Fn(&FailureRecord) -> bool,
    {
        if outcome.total_documents() != self.len() {
            return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                "outcome covers {} documents but the round sent {}",
                outcome.total_documents(),
                self.len()
            )));
        }

        let mut failed: Vec<&FailureRecord> = outcome.errors().iter().collect();
        failed.sort_unstable_by_key(|record| record.current_position());

        let mut parts = Vec::with_capacity(failed.len());
        for record in failed {
            let current = record.current_position();
            let entry = self.entries.get(current).ok_or_else(|| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("failure points outside the round buffer")
                    .with_position(current)
            })?;
            if entry.original_position != record.original_position() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!(
                        "failure at current position {current} claims original position {} but the buffer holds {}",
                        record.original_position(),
                        entry.original_position
                    ))
                    .with_position(current));
            }
            if keep(record) {
                parts.push((
                    entry.original_position,
                    self.data.slice(entry.range.clone()),
                ));
            }
        }
        Ok(Self::assemble(parts))
    }
}
