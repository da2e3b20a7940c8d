//! Routes inbound wire messages to store mutations.
//!
//! Classification happens in two stages: the `type` discriminant is
//! checked against the closed kind set, then the whole payload is parsed
//! into its typed form before any mutation runs. A message that fails
//! either stage is discarded with a diagnostic and the store is left
//! untouched; partial application is impossible.

use serde_json::Value;
use tracing::debug;

use shared::protocol::{ServerMessage, SERVER_MESSAGE_TYPES};

use crate::error::ProtocolError;
use crate::store::StateStore;

/// What a successfully dispatched message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    InstrumentUpdated,
    TestStarted,
    StepStarted,
    StepCompleted,
    TestCompleted,
    TestFailed,
    Progress,
}

pub fn dispatch(store: &StateStore, raw: &Value) -> Result<Dispatch, ProtocolError> {
    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .filter(|kind| !kind.is_empty())
        .ok_or(ProtocolError::MissingType)?;
    if !SERVER_MESSAGE_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }
    let message: ServerMessage =
        serde_json::from_value(raw.clone()).map_err(|source| ProtocolError::Malformed {
            kind: kind.to_string(),
            source,
        })?;
    Ok(apply(store, message))
}

/// Each recognized kind maps to exactly one store mutation; messages are
/// applied in arrival order with no reordering or batching.
fn apply(store: &StateStore, message: ServerMessage) -> Dispatch {
    match message {
        ServerMessage::InstrumentStatus { instrument, data } => {
            store.update_instrument(&instrument, data);
            Dispatch::InstrumentUpdated
        }
        ServerMessage::TestStarted { test_id, .. } => {
            store.set_test_running(true, Some(test_id));
            Dispatch::TestStarted
        }
        ServerMessage::StepCompleted { result, .. } => {
            store.add_test_result(result);
            Dispatch::StepCompleted
        }
        ServerMessage::TestCompleted { .. } => {
            store.set_test_running(false, None);
            Dispatch::TestCompleted
        }
        ServerMessage::TestError { error, .. } => {
            store.fail_test_run(error);
            Dispatch::TestFailed
        }
        // Recognized but without a store effect; the console reads run
        // progress off step_completed accumulation instead.
        ServerMessage::StepStarted { step, .. } => {
            debug!(step = step.as_deref().unwrap_or("?"), "step started");
            Dispatch::StepStarted
        }
        ServerMessage::TestProgress { progress, .. } => {
            debug!(progress = progress.unwrap_or(0.0), "test progress");
            Dispatch::Progress
        }
    }
}
