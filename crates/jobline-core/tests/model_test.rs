//! Domain model invariants.

use std::time::Duration;

use jobline_core::{EnqueueResult, ErrorCode, JobSubmission, Payload, TaskIdentifier, NO_STRATEGY};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn well_formed_identifiers_accepted(name in "[a-z][a-z0-9_:.-]{0,40}") {
        let task = TaskIdentifier::new(name.clone()).unwrap();
        prop_assert_eq!(task.as_str(), name.as_str());
    }

    #[test]
    fn whitespace_only_identifiers_rejected(name in "[ \t\n]{0,8}") {
        prop_assert!(TaskIdentifier::new(name).is_err());
    }

    #[test]
    fn queue_row_never_carries_max_attempts(max_attempts in proptest::option::of(1u32..100)) {
        let mut job = JobSubmission::new(TaskIdentifier::new("ping").unwrap());
        job.max_attempts = max_attempts;

        let row = job.queue_row();
        prop_assert!(row.get("max_attempts").is_none());
        prop_assert_eq!(&job.rpc_params()["max_attempts"], &json!(max_attempts));
    }
}

#[test]
fn submission_round_trips_through_json() {
    let mut payload = Payload::new();
    payload.insert("menu_id".to_string(), json!(12));
    let job = JobSubmission::new(TaskIdentifier::new("publish_menu").unwrap())
        .with_payload(payload)
        .with_max_attempts(3);

    let encoded = serde_json::to_string(&job).unwrap();
    let decoded: JobSubmission = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded, job);
}

#[test]
fn result_invariants_hold_for_constructors() {
    let ok = EnqueueResult::succeeded("direct_insert", 2, Duration::from_millis(1_020));
    assert!(ok.succeeded);
    assert_eq!(ok.error_code, None);
    assert_ne!(ok.strategy_used, NO_STRATEGY);

    let failed = EnqueueResult::failed(ErrorCode::UnexpectedError, None, 1, Duration::ZERO);
    assert!(!failed.succeeded);
    assert!(failed.error_code.is_some());
    assert_eq!(failed.strategy_used, NO_STRATEGY);
}
