// Core modules implementing outcomes, round buffers, cross-round tracking, and errors.
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod round;
