use serde::{Deserialize, Serialize};

use crate::domain::{InstrumentUpdate, Sequence, StepReport};

/// Message types the backend is known to emit. The dispatcher rejects
/// anything outside this list before attempting a typed parse.
pub const SERVER_MESSAGE_TYPES: [&str; 7] = [
    "instrument_status",
    "test_started",
    "step_started",
    "step_completed",
    "test_completed",
    "test_error",
    "test_progress",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InstrumentStatus {
        instrument: String,
        data: InstrumentUpdate,
    },
    TestStarted {
        test_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_steps: Option<u32>,
    },
    StepStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_number: Option<u32>,
    },
    StepCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        result: StepReport,
    },
    TestCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps_passed: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_steps: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    TestError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_id: Option<String>,
        error: String,
    },
    TestProgress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    StartTest { sequence: Sequence },
    StopTest,
}
