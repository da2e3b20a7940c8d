use serde_json::json;

use crate::domain::{
    Instrument, InstrumentHealth, InstrumentUpdate, Sequence, Step, StepKind,
};
use crate::protocol::{ClientCommand, ServerMessage};

#[test]
fn instrument_status_parses_flat_wire_object() {
    let raw = json!({
        "type": "instrument_status",
        "instrument": "psu1",
        "data": {
            "connected": true,
            "status": "connected",
            "lastReading": { "voltage": 5.0, "current": 0.1 }
        },
        "timestamp": 1723.5
    });

    let message: ServerMessage = serde_json::from_value(raw).expect("parse");
    let ServerMessage::InstrumentStatus { instrument, data } = message else {
        panic!("wrong variant");
    };
    assert_eq!(instrument, "psu1");
    assert_eq!(data.connected, Some(true));
    assert_eq!(data.status, Some(InstrumentHealth::Connected));
    let reading = data.last_reading.expect("reading");
    assert_eq!(reading.get("voltage"), Some(&5.0));
}

#[test]
fn step_completed_requires_result_payload() {
    let raw = json!({ "type": "step_completed", "test_id": "t1" });
    assert!(serde_json::from_value::<ServerMessage>(raw).is_err());
}

#[test]
fn step_completed_carries_step_report() {
    let raw = json!({
        "type": "step_completed",
        "test_id": "t1",
        "step": "Measure 5V rail",
        "result": {
            "step_name": "Measure 5V rail",
            "step_number": 2,
            "start_time": "2025-03-01T10:00:00.123456",
            "passed": true,
            "measurements": { "voltage": 5.01, "expected": 5.0, "tolerance": 0.1 },
            "duration": 0.02
        }
    });

    let message: ServerMessage = serde_json::from_value(raw).expect("parse");
    let ServerMessage::StepCompleted { result, .. } = message else {
        panic!("wrong variant");
    };
    assert_eq!(result.step_name, "Measure 5V rail");
    assert_eq!(result.step_number, Some(2));
    assert!(result.passed);
    assert_eq!(result.measurements.get("voltage"), Some(&5.01));
}

#[test]
fn explicit_null_error_clears_while_absent_keeps() {
    let mut instrument = Instrument::offline("psu1");
    instrument.error = Some("overcurrent".to_string());

    let absent: InstrumentUpdate =
        serde_json::from_value(json!({ "connected": true })).expect("parse");
    instrument.apply(absent);
    assert_eq!(instrument.error.as_deref(), Some("overcurrent"));

    let cleared: InstrumentUpdate =
        serde_json::from_value(json!({ "error": null })).expect("parse");
    instrument.apply(cleared);
    assert_eq!(instrument.error, None);
}

#[test]
fn step_wire_format_is_internally_tagged() {
    let step = Step::PowerSupply {
        name: "Set 5V".to_string(),
        voltage: 5.0,
        current_limit: 1.0,
    };
    let value = serde_json::to_value(&step).expect("serialize");
    assert_eq!(value["type"], "power_supply");
    assert_eq!(value["name"], "Set 5V");
    assert_eq!(value["voltage"], 5.0);

    let parsed: Step = serde_json::from_value(value).expect("parse");
    assert_eq!(parsed.kind(), StepKind::PowerSupply);
}

#[test]
fn sequence_accepts_payload_without_optional_fields() {
    let raw = json!({
        "id": "board_bringup",
        "name": "Board bringup",
        "steps": [
            { "type": "delay", "name": "Settle", "delay_ms": 50 }
        ]
    });
    let sequence: Sequence = serde_json::from_value(raw).expect("parse");
    assert!(!sequence.editable);
    assert!(sequence.description.is_empty());
    assert_eq!(sequence.steps.len(), 1);
}

#[test]
fn stop_test_serializes_to_bare_type_object() {
    let value = serde_json::to_value(ClientCommand::StopTest).expect("serialize");
    assert_eq!(value, json!({ "type": "stop_test" }));
}

#[test]
fn start_test_embeds_full_sequence() {
    let command = ClientCommand::StartTest {
        sequence: Sequence {
            id: "demo_basic_power".to_string(),
            name: "Basic power test".to_string(),
            description: String::new(),
            editable: true,
            steps: vec![Step::default_of(StepKind::Delay)],
        },
    };
    let value = serde_json::to_value(&command).expect("serialize");
    assert_eq!(value["type"], "start_test");
    assert_eq!(value["sequence"]["id"], "demo_basic_power");
    assert_eq!(value["sequence"]["steps"][0]["type"], "delay");
}
