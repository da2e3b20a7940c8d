use thiserror::Error;

/// Transport-level faults. Logged and broadcast to fault observers,
/// never fatal; unexpected closes feed the reconnect policy.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("invalid frame: {0}")]
    Parse(String),

    #[error("connection closed unexpectedly: {0}")]
    UnexpectedClose(String),
}

/// An inbound message the dispatcher refuses to apply. The store is
/// untouched in every case.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message missing type discriminant")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Synchronous refusal of a sequence edit; the overlay is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown sequence: {0}")]
    UnknownSequence(String),

    #[error("sequence {0} is not editable")]
    NotEditable(String),

    #[error("a sequence must keep at least one step")]
    LastStep,

    #[error("step index {index} out of range for {len} steps")]
    InvalidIndex { index: usize, len: usize },

    #[error("field {field} does not apply to a {step_kind} step")]
    FieldMismatch {
        field: &'static str,
        step_kind: &'static str,
    },
}

/// Failure of a REST call to the backend. Store consistency is never
/// affected; the caller surfaces these to the operator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),

    #[error("backend rejected request ({status}): {detail}")]
    Status { status: u16, detail: String },
}
