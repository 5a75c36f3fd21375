//! Purpose: Define the stable public Rust API boundary for bulkwrite.
//! Exports: Outcome, round buffer, ledger, and error types used by decoders and retry drivers.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path to core types.

pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::ledger::{
    DEFAULT_MAX_ROUNDS, DEFAULT_RETRY_STATUSES, DocumentState, RetryConfig, RetryLedger,
    RoundSummary,
};
pub use crate::core::outcome::{
    BulkOutcome, BulkStatus, FailureRecord, HTTP_OK, PartialOutcome, RoundStats,
};
pub use crate::core::round::{DocumentFailure, RoundBuffer};
