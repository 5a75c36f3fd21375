//! Purpose: Drive scripted bulk rounds through outcomes, round buffers, and the retry ledger.
//! Exports: `ScriptedRound`, `ScriptedFailure`, `read_documents`, `parse_rounds`, `replay`.
//! Role: Decoder and retry driver for the CLI; the script stands in for engine responses.
//! Invariants: Failure positions in a script are current positions for that round.
//! Invariants: Rounds past the end of the script succeed for every document sent.
//! Invariants: Only retryable failures are resent; succeeded documents never are.
use std::io::BufRead;

use bulkwrite::api::{
    BulkOutcome, DocumentFailure, Error, ErrorKind, HTTP_OK, RetryConfig, RetryLedger, RoundBuffer,
};
use bulkwrite::report::{ReportConfig, outcome_json, round_summary_json};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScriptedRound {
    #[serde(default = "default_http_status")]
    pub http_status: u16,
    #[serde(default)]
    pub elapsed_ms: i64,
    #[serde(default)]
    pub failures: Vec<ScriptedFailure>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScriptedFailure {
    pub position: usize,
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

fn default_http_status() -> u16 {
    HTTP_OK
}

/// Reads one document per non-blank line; each keeps its trailing newline.
pub fn read_documents<R: BufRead>(reader: R) -> Result<Vec<Vec<u8>>, Error> {
    let mut documents = Vec::new();
    for line in reader.split(b'\n') {
        let mut line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read documents")
                .with_source(err)
        })?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        line.push(b'\n');
        documents.push(line);
    }
    Ok(documents)
}

pub fn parse_rounds(input: &str) -> Result<Vec<ScriptedRound>, Error> {
    serde_json::from_str(input).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid rounds script: {err}"))
            .with_hint("Expected a JSON array of {\"http_status\", \"elapsed_ms\", \"failures\"} objects.")
            .with_source(err)
    })
}

/// Runs every round and hands each report line to `emit`.
pub fn replay<F>(
    documents: Vec<Vec<u8>>,
    rounds: Vec<ScriptedRound>,
    retry: RetryConfig,
    report: &ReportConfig,
    mut emit: F,
) -> Result<RetryLedger, Error>
where
    F: FnMut(Value) -> Result<(), Error>,
{
    let mut buffer = RoundBuffer::from_documents(documents);
    let mut ledger = RetryLedger::new(&buffer, retry);
    if buffer.is_empty() {
        emit(round_line(0, &BulkOutcome::complete(), None, report))?;
        return Ok(ledger);
    }

    let mut script = rounds.into_iter();
    loop {
        let scripted = script.next().unwrap_or(ScriptedRound {
            http_status: HTTP_OK,
            elapsed_ms: 0,
            failures: Vec::new(),
        });
        let failures = scripted
            .failures
            .into_iter()
            .map(|failure| DocumentFailure::new(failure.position, failure.status, failure.message))
            .collect();
        let outcome = buffer.outcome(scripted.http_status, scripted.elapsed_ms, failures)?;
        let summary = ledger.record(&buffer, &outcome)?;
        info!(round = summary.round, "{outcome}");
        emit(round_line(summary.round, &outcome, Some(round_summary_json(&summary)), report))?;

        if !ledger.should_retry() {
            break;
        }
        buffer = ledger.retry_buffer(&buffer, &outcome)?;
    }
    Ok(ledger)
}

fn round_line(
    round: usize,
    outcome: &BulkOutcome,
    summary: Option<Value>,
    report: &ReportConfig,
) -> Value {
    let mut value = outcome_json(outcome, report);
    if let Value::Object(map) = &mut value {
        map.insert("round".to_string(), json!(round));
        if let Some(summary) = summary {
            map.insert("ledger".to_string(), summary);
        }
    }
    value
}
