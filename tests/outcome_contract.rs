//! Purpose: Lock the bulk outcome contract and multi-round position reconciliation.
//! Exports: Integration tests only (no runtime exports).
//! Role: Exercise the public `api` surface the way decoders and retry drivers use it.
//! Invariants: Each round's outcome is checked alone; cross-round identity goes through the ledger.

use bulkwrite::api::{
    BulkOutcome, BulkStatus, DocumentFailure, DocumentState, ErrorKind, FailureRecord, RetryConfig,
    RetryLedger, RoundBuffer,
};
use bytes::Bytes;

fn conflict(original: usize, current: usize, payload: &'static [u8]) -> FailureRecord {
    FailureRecord::new(
        original,
        current,
        Bytes::from_static(payload),
        409,
        "version conflict",
    )
}

#[test]
fn empty_complete_equals_explicit_ok_round() {
    for outcome in [BulkOutcome::complete(), BulkOutcome::complete_with(200, 0, 0)] {
        assert_eq!(outcome.status(), BulkStatus::Complete);
        assert_eq!(outcome.http_status(), 200);
        assert_eq!(outcome.elapsed_ms(), 0);
        assert_eq!(outcome.total_documents(), 0);
        assert!(outcome.errors().is_empty());
    }
}

#[test]
fn complete_carries_any_metadata_verbatim() {
    for (status, elapsed, total) in [(200, 0, 0), (201, -7, 3), (999, i64::MAX, 10_000)] {
        let outcome = BulkOutcome::complete_with(status, elapsed, total);
        assert_eq!(outcome.status(), BulkStatus::Complete);
        assert_eq!(outcome.http_status(), status);
        assert_eq!(outcome.elapsed_ms(), elapsed);
        assert_eq!(outcome.total_documents(), total);
        assert!(outcome.errors().is_empty());
    }
}

#[test]
fn partial_keeps_failures_in_discovery_order() {
    let errors = vec![
        conflict(4, 4, b"d4"),
        conflict(0, 0, b"d0"),
        conflict(2, 2, b"d2"),
    ];
    let outcome = BulkOutcome::partial(200, 55, 6, errors.clone()).expect("partial");
    assert_eq!(outcome.status(), BulkStatus::Partial);
    assert_eq!(outcome.errors(), errors.as_slice());
    assert_eq!(outcome.errors(), outcome.errors());
}

#[test]
fn failure_record_accessors_return_inputs_unchanged() {
    let payload = Bytes::from_static(b"{\"index\":{}}\n{\"title\":\"x\"}\n");
    let record = FailureRecord::new(5, 2, payload.clone(), 409, "conflict");
    assert_eq!(record.original_position(), 5);
    assert_eq!(record.current_position(), 2);
    assert_eq!(record.payload(), &payload);
    assert_eq!(record.document_status(), 409);
    assert_eq!(record.error_message(), "conflict");
}

#[test]
fn all_documents_succeed() {
    let outcome = BulkOutcome::complete_with(200, 120, 3);
    assert_eq!(outcome.status(), BulkStatus::Complete);
    assert_eq!(outcome.total_documents(), 3);
    assert_eq!(outcome.errors().len(), 0);
    assert_eq!(outcome.success_count(), 3);
}

#[test]
fn two_of_five_documents_conflict() {
    let errors = vec![conflict(1, 1, b"P1"), conflict(3, 2, b"P2")];
    let outcome = BulkOutcome::partial(200, 340, 5, errors).expect("partial");
    assert_eq!(outcome.status(), BulkStatus::Partial);
    assert_eq!(outcome.errors().len(), 2);
    assert_eq!(outcome.success_count(), 3);
    assert!(!outcome.is_complete());
}

#[test]
fn retry_round_reconciles_original_positions() {
    let retry = RetryConfig {
        retry_statuses: vec![409],
        max_rounds: 3,
    };
    let first = RoundBuffer::from_documents(["d0\n", "d1\n", "d2\n", "d3\n", "d4\n"]);
    let mut ledger = RetryLedger::new(&first, retry);

    let outcome = first
        .outcome(
            200,
            340,
            vec![
                DocumentFailure::new(1, 409, "version conflict"),
                DocumentFailure::new(3, 409, "version conflict"),
            ],
        )
        .expect("first round");
    let summary = ledger.record(&first, &outcome).expect("record first");
    assert_eq!(summary.succeeded, 3);
    assert_eq!(ledger.pending_retry(), vec![1, 3]);
    assert!(ledger.should_retry());

    let second = ledger.retry_buffer(&first, &outcome).expect("compact");
    assert_eq!(second.len(), 2);
    assert_eq!(second.as_bytes().as_ref(), b"d1\nd3\n");
    assert_eq!(second.original_positions().collect::<Vec<_>>(), vec![1, 3]);

    let outcome = second.outcome(200, 50, Vec::new()).expect("second round");
    assert_eq!(outcome, BulkOutcome::complete_with(200, 50, 2));
    ledger.record(&second, &outcome).expect("record second");

    assert!(ledger.is_settled());
    assert!(ledger.failed().is_empty());
    assert_eq!(ledger.succeeded(), vec![0, 1, 2, 3, 4]);
    assert_eq!(ledger.state(0), Some(&DocumentState::Succeeded { round: 1 }));
    assert_eq!(ledger.state(1), Some(&DocumentState::Succeeded { round: 2 }));
    assert_eq!(ledger.state(3), Some(&DocumentState::Succeeded { round: 2 }));
}

#[test]
fn compacted_round_failure_reports_original_identity() {
    let first = RoundBuffer::from_documents(["a\n", "b\n", "c\n", "d\n"]);
    let mut ledger = RetryLedger::new(&first, RetryConfig::default());
    let outcome = first
        .outcome(
            200,
            10,
            vec![
                DocumentFailure::new(0, 429, "rejected"),
                DocumentFailure::new(2, 429, "rejected"),
            ],
        )
        .expect("first");
    ledger.record(&first, &outcome).expect("record");
    let second = ledger.retry_buffer(&first, &outcome).expect("compact");

    let outcome = second
        .outcome(200, 10, vec![DocumentFailure::new(1, 400, "mapper_parsing_exception")])
        .expect("second");
    let record = &outcome.errors()[0];
    assert_eq!(record.current_position(), 1);
    assert_eq!(record.original_position(), 2);
    assert_eq!(record.payload().as_ref(), b"c\n");

    ledger.record(&second, &outcome).expect("record");
    assert!(ledger.is_settled());
    assert_eq!(ledger.failed(), vec![2]);
    match ledger.state(2) {
        Some(DocumentState::Failed {
            round,
            status,
            retryable,
            ..
        }) => {
            assert_eq!(*round, 2);
            assert_eq!(*status, 400);
            assert!(!retryable);
        }
        other => panic!("expected failed state, got {other:?}"),
    }
}

#[test]
fn partial_without_failures_is_rejected() {
    let err = BulkOutcome::partial(200, 1, 3, Vec::new()).expect_err("empty partial");
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn partial_rejects_more_failures_than_documents() {
    let err = BulkOutcome::partial(200, 1, 1, vec![conflict(0, 0, b"a"), conflict(1, 1, b"b")])
        .expect_err("count mismatch");
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn partial_outcome_is_never_recorded_as_success() {
    let buffer = RoundBuffer::from_documents(["a\n", "b\n", "c\n"]);
    let mut ledger = RetryLedger::new(&buffer, RetryConfig::default());
    let failure = buffer.failure(0, 429, "rejected").expect("failure");
    let outcome = BulkOutcome::partial(200, 1, 3, vec![failure]).expect("partial");
    match &outcome {
        BulkOutcome::Partial(partial) => assert!(!partial.errors().is_empty()),
        BulkOutcome::Complete(_) => panic!("expected partial outcome"),
    }

    let summary = ledger.record(&buffer, &outcome).expect("record");
    assert_eq!(summary.failed, 1);
    assert!(!ledger.is_settled());
    assert_eq!(ledger.pending_retry(), vec![0]);
}
