use serde_json::json;

use shared::domain::InstrumentHealth;

use crate::dispatcher::{dispatch, Dispatch};
use crate::error::ProtocolError;
use crate::store::StateStore;

#[test]
fn missing_type_is_rejected_and_store_untouched() {
    let store = StateStore::new();
    let before = store.snapshot();

    for raw in [
        json!({ "instrument": "psu1" }),
        json!({ "type": "" }),
        json!({ "type": 42 }),
        json!("not an object"),
    ] {
        let err = dispatch(&store, &raw).expect_err("must be rejected");
        assert!(matches!(err, ProtocolError::MissingType));
    }
    assert_eq!(store.snapshot(), before);
}

#[test]
fn unknown_type_is_rejected_and_store_untouched() {
    let store = StateStore::new();
    let before = store.snapshot();

    let err = dispatch(&store, &json!({ "type": "firmware_update" })).expect_err("unknown");
    assert!(matches!(err, ProtocolError::UnknownType(kind) if kind == "firmware_update"));
    assert_eq!(store.snapshot(), before);
}

#[test]
fn malformed_known_kind_never_partially_applies() {
    let store = StateStore::new();
    store.set_test_running(true, Some("t1".to_string()));
    let before = store.snapshot();

    // step_completed without its result payload
    let err = dispatch(&store, &json!({ "type": "step_completed", "test_id": "t1" }))
        .expect_err("malformed");
    assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "step_completed"));

    // instrument_status whose status is outside the closed enum
    let err = dispatch(
        &store,
        &json!({
            "type": "instrument_status",
            "instrument": "psu1",
            "data": { "status": "on fire" }
        }),
    )
    .expect_err("malformed");
    assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "instrument_status"));

    assert_eq!(store.snapshot(), before);
}

#[test]
fn instrument_status_merges_into_named_instrument() {
    let store = StateStore::new();
    let applied = dispatch(
        &store,
        &json!({
            "type": "instrument_status",
            "instrument": "psu1",
            "data": {
                "connected": true,
                "status": "connected",
                "lastReading": { "voltage": 5.0 }
            }
        }),
    )
    .expect("valid");
    assert_eq!(applied, Dispatch::InstrumentUpdated);

    let psu = store.instrument("psu1").expect("created");
    assert!(psu.connected);
    assert_eq!(psu.status, InstrumentHealth::Connected);
    assert_eq!(psu.last_reading.get("voltage"), Some(&5.0));
}

fn step_completed(name: &str, passed: bool) -> serde_json::Value {
    json!({
        "type": "step_completed",
        "test_id": "t1",
        "step": name,
        "result": {
            "step_name": name,
            "passed": passed,
            "measurements": { "voltage": 5.0 },
            "duration": 0.02
        }
    })
}

#[test]
fn full_run_scenario() {
    let store = StateStore::new();
    dispatch(&store, &json!({ "type": "test_started", "test_id": "t1" })).expect("started");
    assert!(store.read(|state| state.test_run.running));

    for n in 0..3 {
        dispatch(&store, &step_completed(&format!("step {n}"), true)).expect("step");
    }
    dispatch(&store, &json!({ "type": "test_completed", "test_id": "t1" })).expect("completed");

    let (running, current, results) = store.read(|state| {
        (
            state.test_run.running,
            state.test_run.current_test_id.clone(),
            state.test_results.len(),
        )
    });
    assert!(!running);
    assert_eq!(current, None);
    assert_eq!(results, 3);
}

#[test]
fn results_are_scoped_to_the_active_run() {
    let store = StateStore::new();

    dispatch(&store, &json!({ "type": "test_started", "test_id": "t1" })).expect("start");
    for n in 0..5 {
        dispatch(&store, &step_completed(&format!("a{n}"), true)).expect("step");
    }

    // A new start clears before any of its steps arrive, so accumulation
    // always matches the step_completed count since the last test_started.
    dispatch(&store, &json!({ "type": "test_started", "test_id": "t2" })).expect("restart");
    for n in 0..2 {
        dispatch(&store, &step_completed(&format!("b{n}"), false)).expect("step");
    }

    assert_eq!(store.read(|state| state.test_results.len()), 2);
    assert_eq!(
        store.read(|state| state.test_run.current_test_id.clone()),
        Some("t2".to_string())
    );
}

#[test]
fn test_error_ends_run_and_records_detail() {
    let store = StateStore::new();
    dispatch(&store, &json!({ "type": "test_started", "test_id": "t1" })).expect("start");
    let applied = dispatch(
        &store,
        &json!({ "type": "test_error", "test_id": "t1", "error": "instrument timeout" }),
    )
    .expect("error applies");
    assert_eq!(applied, Dispatch::TestFailed);

    let run = store.read(|state| state.test_run.clone());
    assert!(!run.running);
    assert_eq!(run.current_test_id, None);
    assert_eq!(run.last_error.as_deref(), Some("instrument timeout"));
}

#[test]
fn progress_kinds_are_recognized_noops() {
    let store = StateStore::new();
    dispatch(&store, &json!({ "type": "test_started", "test_id": "t1" })).expect("start");
    let before = store.snapshot();

    let applied = dispatch(
        &store,
        &json!({ "type": "step_started", "test_id": "t1", "step": "Set 5V", "step_number": 1 }),
    )
    .expect("recognized");
    assert_eq!(applied, Dispatch::StepStarted);

    let applied = dispatch(
        &store,
        &json!({ "type": "test_progress", "test_id": "t1", "progress": 0.4 }),
    )
    .expect("recognized");
    assert_eq!(applied, Dispatch::Progress);

    assert_eq!(store.snapshot(), before);
}
