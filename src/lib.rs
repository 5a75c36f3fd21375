//! Purpose: Client-side bookkeeping for bulk document writes and their selective retry.
//! Exports: `api` (outcomes, round buffers, retry ledger, errors), `report` (JSON rendering).
//! Role: Library backing the `bulkwrite` CLI; transports and response decoders build on `api`.
//! Invariants: Outcomes are immutable once constructed; retries never resend succeeded documents.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub(crate) mod core;
pub mod report;
