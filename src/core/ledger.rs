// Cross-round document state keyed by original position.
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::outcome::BulkOutcome;
use crate::core::round::RoundBuffer;

pub const DEFAULT_RETRY_STATUSES: [u16; 1] = [429];
pub const DEFAULT_MAX_ROUNDS: usize = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryConfig {
    /// Per-document statuses worth resending; anything else is terminal.
    pub retry_statuses: Vec<u16>,
    /// Upper bound on rounds, the first submission included.
    pub max_rounds: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl RetryConfig {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DocumentState {
    Pending,
    Succeeded {
        round: usize,
    },
    Failed {
        round: usize,
        status: u16,
        message: String,
        retryable: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoundSummary {
    pub round: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retryable: usize,
}

/// Latest known state of every document in a multi-round bulk write.
#[derive(Clone, Debug)]
pub struct RetryLedger {
    config: RetryConfig,
    states: BTreeMap<usize, DocumentState>,
    rounds: usize,
}

impl RetryLedger {
    /// Starts tracking every document of the first-round buffer as pending.
    pub fn new(initial: &RoundBuffer, config: RetryConfig) -> Self {
        let states = initial
            .original_positions()
            .map(|original| (original, DocumentState::Pending))
            .collect();
        Self {
            config,
            states,
            rounds: 0,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Rounds recorded so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn state(&self, original: usize) -> Option<&DocumentState> {
        self.states.get(&original)
    }

    pub fn states(&self) -> impl Iterator<Item = (usize, &DocumentState)> + '_ {
        self.states.iter().map(|(original, state)| (*original, state))
    }

    /// Applies one round's outcome. `buffer` must be the buffer that round sent.
    ///
    /// The ledger is left untouched when the outcome does not line up with the
    /// buffer or names a document that already succeeded.
    pub fn record(
        &mut self,
        buffer: &RoundBuffer,
        outcome: &BulkOutcome,
    ) -> Result<RoundSummary, Error> {
        if outcome.total_documents() != buffer.len() {
            return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                "outcome covers {} documents but the round sent {}",
                outcome.total_documents(),
                buffer.len()
            )));
        }
        for original in buffer.original_positions() {
            match self.states.get(&original) {
                None => {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message("round sent a document the ledger does not track")
                        .with_position(original));
                }
                Some(DocumentState::Succeeded { round }) => {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message(format!("document already succeeded in round {round}"))
                        .with_position(original)
                        .with_hint(
                            "Rebuild retry buffers from the previous round's failures only.",
                        ));
                }
                Some(_) => {}
            }
        }
        let mut failed = HashMap::with_capacity(outcome.error_count());
        for record in outcome.errors() {
            let current = record.current_position();
            if buffer.original_position(current) != Some(record.original_position()) {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("failure does not match the document at its current position")
                    .with_position(current));
            }
            failed.insert(current, record);
        }

        self.rounds += 1;
        let round = self.rounds;
        let mut summary = RoundSummary {
            round,
            attempted: buffer.len(),
            ..RoundSummary::default()
        };
        for (current, original) in buffer.original_positions().enumerate() {
            let state = match failed.get(&current) {
                None => {
                    summary.succeeded += 1;
                    DocumentState::Succeeded { round }
                }
                Some(record) => {
                    let retryable = self.config.is_retryable(record.document_status());
                    summary.failed += 1;
                    if retryable {
                        summary.retryable += 1;
                    } else {
                        warn!(
                            original,
                            status = record.document_status(),
                            reason = record.error_message(),
                            "document failed with a terminal status"
                        );
                    }
                    DocumentState::Failed {
                        round,
                        status: record.document_status(),
                        message: record.error_message().to_string(),
                        retryable,
                    }
                }
            };
            self.states.insert(original, state);
        }

        debug!(
            round,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retryable = summary.retryable,
            http_status = outcome.http_status(),
            elapsed_ms = outcome.elapsed_ms(),
            "recorded bulk round"
        );
        Ok(summary)
    }

    /// Buffer for the next round: the retryable failures of `outcome`.
    pub fn retry_buffer(
        &self,
        buffer: &RoundBuffer,
        outcome: &BulkOutcome,
    ) -> Result<RoundBuffer, Error> {
        buffer.retry_buffer_where(outcome, |record| {
            self.config.is_retryable(record.document_status())
        })
    }

    /// Whether another round is both needed and allowed.
    pub fn should_retry(&self) -> bool {
        self.rounds < self.config.max_rounds && !self.pending_retry().is_empty()
    }

    /// No document is waiting on a first attempt or a retry.
    pub fn is_settled(&self) -> bool {
        self.states.values().all(|state| match state {
            DocumentState::Pending => false,
            DocumentState::Succeeded { .. } => true,
            DocumentState::Failed { retryable, .. } => !retryable,
        })
    }

    /// Original positions whose latest failure is retryable.
    pub fn pending_retry(&self) -> Vec<usize> {
        self.collect(|state| matches!(state, DocumentState::Failed { retryable: true, .. }))
    }

    pub fn succeeded(&self) -> Vec<usize> {
        self.collect(|state| matches!(state, DocumentState::Succeeded { .. }))
    }

    /// Original positions whose latest attempt failed, retryable or not.
    pub fn failed(&self) -> Vec<usize> {
        self.collect(|state| matches!(state, DocumentState::Failed { .. }))
    }

    fn collect<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&DocumentState) -> bool,
    {
        self.states
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(original, _)| *original)
            .collect()
    }
}
