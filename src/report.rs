//! Purpose: Render bulk outcomes and retry ledgers as stable JSON for diagnostics.
//! Exports: `ReportConfig`, `outcome_json`, `ledger_json`, `round_summary_json`.
//! Role: Reporting boundary shared by the CLI and library callers.
//! Invariants: Error samples are bounded by config; document previews are truncated.
//! Invariants: Field names are additive-only once published.
use bstr::ByteSlice;
use serde_json::{Map, Value, json};

use crate::api::{BulkOutcome, DocumentState, FailureRecord, RetryLedger, RoundSummary};

pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 5;
pub const DEFAULT_MAX_DOCUMENT_PREVIEW: usize = 128;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReportConfig {
    pub max_error_samples: usize,
    pub max_document_preview: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
            max_document_preview: DEFAULT_MAX_DOCUMENT_PREVIEW,
        }
    }
}

pub fn outcome_json(outcome: &BulkOutcome, config: &ReportConfig) -> Value {
    let mut inner = Map::new();
    inner.insert("status".to_string(), json!(outcome.status().as_str()));
    inner.insert("http_status".to_string(), json!(outcome.http_status()));
    inner.insert("elapsed_ms".to_string(), json!(outcome.elapsed_ms()));
    inner.insert(
        "total_documents".to_string(),
        json!(outcome.total_documents()),
    );
    inner.insert("success_count".to_string(), json!(outcome.success_count()));
    inner.insert("error_count".to_string(), json!(outcome.error_count()));
    let sample: Vec<Value> = outcome
        .errors()
        .iter()
        .take(config.max_error_samples)
        .map(|record| failure_json(record, config.max_document_preview))
        .collect();
    inner.insert("errors_sample".to_string(), Value::Array(sample));

    let mut outer = Map::new();
    outer.insert("outcome".to_string(), Value::Object(inner));
    Value::Object(outer)
}

pub fn round_summary_json(summary: &RoundSummary) -> Value {
    json!({
        "round": summary.round,
        "attempted": summary.attempted,
        "succeeded": summary.succeeded,
        "failed": summary.failed,
        "retryable": summary.retryable,
    })
}

pub fn ledger_json(ledger: &RetryLedger, config: &ReportConfig) -> Value {
    let failures: Vec<Value> = ledger
        .states()
        .filter_map(|(original, state)| match state {
            DocumentState::Failed {
                round,
                status,
                message,
                retryable,
            } => Some(json!({
                "original_position": original,
                "round": round,
                "status": status,
                "message": message,
                "retryable": retryable,
            })),
            _ => None,
        })
        .take(config.max_error_samples)
        .collect();

    json!({
        "summary": {
            "rounds": ledger.rounds(),
            "documents": ledger.len(),
            "succeeded": ledger.succeeded().len(),
            "failed": ledger.failed().len(),
            "pending_retry": ledger.pending_retry(),
            "settled": ledger.is_settled(),
            "failures_sample": failures,
        }
    })
}

fn failure_json(record: &FailureRecord, max_preview: usize) -> Value {
    json!({
        "original_position": record.original_position(),
        "current_position": record.current_position(),
        "status": record.document_status(),
        "message": record.error_message(),
        "document": truncate_bytes(record.payload(), max_preview),
    })
}

fn truncate_bytes(input: &[u8], max: usize) -> String {
    let text = input.trim_end_with(|c| c == '\n' || c == '\r').to_str_lossy();
    truncate_snippet(&text, max)
}

fn truncate_snippet(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }
    let suffix = "...";
    if max <= suffix.len() {
        return suffix[..max].to_string();
    }
    let mut take = max - suffix.len();
    while !input.is_char_boundary(take) {
        take -= 1;
    }
    let mut snippet = String::with_capacity(take + suffix.len());
    snippet.push_str(&input[..take]);
    snippet.push_str(suffix);
    snippet
}
