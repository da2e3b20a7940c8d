use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    PowerSupply,
    Daq,
    Multimeter,
    Oscilloscope,
    SignalGenerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentHealth {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl InstrumentConfig {
    pub fn new(kind: InstrumentKind) -> Self {
        Self {
            kind,
            resource_name: None,
            device_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub connected: bool,
    pub status: InstrumentHealth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<InstrumentConfig>,
    #[serde(default, rename = "lastReading")]
    pub last_reading: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Instrument {
    /// A placeholder entry for a name the backend has not reported on yet.
    pub fn offline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            status: InstrumentHealth::Disconnected,
            config: None,
            last_reading: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_config(name: impl Into<String>, config: InstrumentConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::offline(name)
        }
    }

    /// Merge a status push into this entry. Only fields present in the
    /// update overwrite; `error` distinguishes absent from explicit null.
    pub fn apply(&mut self, update: InstrumentUpdate) {
        if let Some(connected) = update.connected {
            self.connected = connected;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(config) = update.config {
            self.config = Some(config);
        }
        if let Some(reading) = update.last_reading {
            self.last_reading = reading;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
    }
}

/// Partial instrument data carried by an `instrument_status` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstrumentHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<InstrumentConfig>,
    #[serde(
        default,
        rename = "lastReading",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_reading: Option<BTreeMap<String, f64>>,
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Option<String>>,
}

// `"error": null` must clear the stored error, while an absent key keeps it.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    PowerSupply,
    Measurement,
    Delay,
}

impl StepKind {
    pub fn label(self) -> &'static str {
        match self {
            StepKind::PowerSupply => "power_supply",
            StepKind::Measurement => "measurement",
            StepKind::Delay => "delay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    PowerSupply {
        name: String,
        voltage: f64,
        current_limit: f64,
    },
    Measurement {
        name: String,
        measurement_type: String,
        expected_value: f64,
        tolerance: f64,
    },
    Delay {
        name: String,
        delay_ms: u64,
    },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::PowerSupply { name, .. }
            | Step::Measurement { name, .. }
            | Step::Delay { name, .. } => name,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::PowerSupply { .. } => StepKind::PowerSupply,
            Step::Measurement { .. } => StepKind::Measurement,
            Step::Delay { .. } => StepKind::Delay,
        }
    }

    /// Default-valued step of the given kind, for appending from the console.
    pub fn default_of(kind: StepKind) -> Self {
        match kind {
            StepKind::PowerSupply => Step::PowerSupply {
                name: "New power step".to_string(),
                voltage: 0.0,
                current_limit: 1.0,
            },
            StepKind::Measurement => Step::Measurement {
                name: "New measurement".to_string(),
                measurement_type: "voltage".to_string(),
                expected_value: 0.0,
                tolerance: 0.1,
            },
            StepKind::Delay => Step::Delay {
                name: "New delay".to_string(),
                delay_ms: 100,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub editable: bool,
    pub steps: Vec<Step>,
}

/// Per-step outcome as reported by the backend in `step_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub start_time: String,
    pub passed: bool,
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            reconnect_attempts: 0,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ConnectionStatus::Disconnected)
    }
}
