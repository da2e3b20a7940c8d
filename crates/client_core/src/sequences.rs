//! Sequence catalog and copy-on-write edit overlay.
//!
//! Canonical sequences come from two sources merged by id: server-provided
//! sequences win over the built-in demo sequences. Edits never touch a
//! canonical value; the first edit clones it into an overlay entry, and
//! every mutating operation builds the new sequence value first and then
//! replaces the map entry, so a rejected edit leaves the overlay untouched.

use std::collections::HashMap;

use shared::domain::{Sequence, Step, StepKind};

use crate::error::EditError;

/// Ids starting with this prefix are editable regardless of their flag.
pub const DEMO_ID_PREFIX: &str = "demo";

/// The demo catalog shipped with the console, available without a backend.
pub fn builtin_sequences() -> Vec<Sequence> {
    vec![
        Sequence {
            id: "demo_basic_power".to_string(),
            name: "Basic power test".to_string(),
            description: "Verify DUT output voltages".to_string(),
            editable: true,
            steps: vec![
                Step::PowerSupply {
                    name: "Set supply to 5V".to_string(),
                    voltage: 5.0,
                    current_limit: 1.0,
                },
                Step::Measurement {
                    name: "Measure output voltage".to_string(),
                    measurement_type: "voltage".to_string(),
                    expected_value: 5.0,
                    tolerance: 0.1,
                },
                Step::PowerSupply {
                    name: "Set supply to 12V".to_string(),
                    voltage: 12.0,
                    current_limit: 1.0,
                },
                Step::Measurement {
                    name: "Measure 12V rail".to_string(),
                    measurement_type: "voltage".to_string(),
                    expected_value: 12.0,
                    tolerance: 0.2,
                },
                Step::PowerSupply {
                    name: "Power down".to_string(),
                    voltage: 0.0,
                    current_limit: 0.1,
                },
            ],
        },
        Sequence {
            id: "demo_full_functional".to_string(),
            name: "Full functional test".to_string(),
            description: "Complete functional test suite".to_string(),
            editable: true,
            steps: vec![
                Step::PowerSupply {
                    name: "Initialize".to_string(),
                    voltage: 0.0,
                    current_limit: 0.5,
                },
                Step::PowerSupply {
                    name: "Apply 3.3V".to_string(),
                    voltage: 3.3,
                    current_limit: 1.0,
                },
                Step::Measurement {
                    name: "Verify 3.3V".to_string(),
                    measurement_type: "voltage".to_string(),
                    expected_value: 3.3,
                    tolerance: 0.05,
                },
                Step::Delay {
                    name: "Wait for stabilization".to_string(),
                    delay_ms: 100,
                },
                Step::PowerSupply {
                    name: "Apply 5V".to_string(),
                    voltage: 5.0,
                    current_limit: 1.0,
                },
                Step::Measurement {
                    name: "Verify 5V".to_string(),
                    measurement_type: "voltage".to_string(),
                    expected_value: 5.0,
                    tolerance: 0.1,
                },
                Step::Measurement {
                    name: "Load test".to_string(),
                    measurement_type: "current".to_string(),
                    expected_value: 0.5,
                    tolerance: 0.1,
                },
                Step::PowerSupply {
                    name: "Finalize".to_string(),
                    voltage: 0.0,
                    current_limit: 0.1,
                },
            ],
        },
    ]
}

/// One patchable field of a step. Applying a field to a step kind that
/// lacks it is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEdit {
    Name(String),
    Voltage(f64),
    CurrentLimit(f64),
    MeasurementType(String),
    ExpectedValue(f64),
    Tolerance(f64),
    DelayMs(u64),
}

impl StepEdit {
    fn field(&self) -> &'static str {
        match self {
            StepEdit::Name(_) => "name",
            StepEdit::Voltage(_) => "voltage",
            StepEdit::CurrentLimit(_) => "current_limit",
            StepEdit::MeasurementType(_) => "measurement_type",
            StepEdit::ExpectedValue(_) => "expected_value",
            StepEdit::Tolerance(_) => "tolerance",
            StepEdit::DelayMs(_) => "delay_ms",
        }
    }
}

/// Field-patched copy of a step; the original is left untouched.
fn patch_step(step: &Step, edit: StepEdit) -> Result<Step, EditError> {
    let mut patched = step.clone();
    let mismatch = |edit: &StepEdit| EditError::FieldMismatch {
        field: edit.field(),
        step_kind: step.kind().label(),
    };
    match (&mut patched, edit) {
        (Step::PowerSupply { name, .. }, StepEdit::Name(value))
        | (Step::Measurement { name, .. }, StepEdit::Name(value))
        | (Step::Delay { name, .. }, StepEdit::Name(value)) => *name = value,
        (Step::PowerSupply { voltage, .. }, StepEdit::Voltage(value)) => *voltage = value,
        (Step::PowerSupply { current_limit, .. }, StepEdit::CurrentLimit(value)) => {
            *current_limit = value;
        }
        (
            Step::Measurement {
                measurement_type, ..
            },
            StepEdit::MeasurementType(value),
        ) => *measurement_type = value,
        (
            Step::Measurement {
                expected_value, ..
            },
            StepEdit::ExpectedValue(value),
        ) => *expected_value = value,
        (Step::Measurement { tolerance, .. }, StepEdit::Tolerance(value)) => *tolerance = value,
        (Step::Delay { delay_ms, .. }, StepEdit::DelayMs(value)) => *delay_ms = value,
        (_, edit) => return Err(mismatch(&edit)),
    }
    Ok(patched)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub editable: bool,
    pub modified: bool,
    pub steps: usize,
}

#[derive(Debug, Default)]
pub struct SequenceWorkspace {
    builtin: Vec<Sequence>,
    server: Vec<Sequence>,
    overlays: HashMap<String, Sequence>,
}

impl SequenceWorkspace {
    pub fn new() -> Self {
        Self {
            builtin: builtin_sequences(),
            server: Vec::new(),
            overlays: HashMap::new(),
        }
    }

    /// Replace the server-provided catalog. Overlays are keyed by id and
    /// deliberately survive a refresh: staged edits are the operator's.
    pub fn set_server_sequences(&mut self, sequences: Vec<Sequence>) {
        self.server = sequences;
    }

    fn canonical(&self, id: &str) -> Option<&Sequence> {
        self.server
            .iter()
            .find(|sequence| sequence.id == id)
            .or_else(|| self.builtin.iter().find(|sequence| sequence.id == id))
    }

    /// Overlay if present, else the canonical sequence.
    pub fn resolve(&self, id: &str) -> Option<Sequence> {
        self.overlays
            .get(id)
            .or_else(|| self.canonical(id))
            .cloned()
    }

    pub fn is_modified(&self, id: &str) -> bool {
        self.overlays.contains_key(id)
    }

    /// Every canonical id once, server entries shadowing built-ins.
    pub fn summaries(&self) -> Vec<SequenceSummary> {
        let mut summaries: Vec<SequenceSummary> = Vec::new();
        for sequence in self.server.iter().chain(self.builtin.iter()) {
            if summaries.iter().any(|summary| summary.id == sequence.id) {
                continue;
            }
            let resolved = self.overlays.get(&sequence.id).unwrap_or(sequence);
            summaries.push(SequenceSummary {
                id: sequence.id.clone(),
                name: resolved.name.clone(),
                description: resolved.description.clone(),
                editable: sequence.editable || sequence.id.starts_with(DEMO_ID_PREFIX),
                modified: self.overlays.contains_key(&sequence.id),
                steps: resolved.steps.len(),
            });
        }
        summaries
    }

    /// Working copy for a mutating operation: the overlay when one exists,
    /// else a clone of the canonical value. Enforces the editability gate.
    fn working_copy(&self, id: &str) -> Result<Sequence, EditError> {
        let canonical = self
            .canonical(id)
            .ok_or_else(|| EditError::UnknownSequence(id.to_string()))?;
        if !canonical.editable && !id.starts_with(DEMO_ID_PREFIX) {
            return Err(EditError::NotEditable(id.to_string()));
        }
        Ok(self
            .overlays
            .get(id)
            .cloned()
            .unwrap_or_else(|| canonical.clone()))
    }

    fn commit(&mut self, id: &str, sequence: Sequence) {
        self.overlays.insert(id.to_string(), sequence);
    }

    pub fn edit_step(&mut self, id: &str, index: usize, edit: StepEdit) -> Result<(), EditError> {
        let mut working = self.working_copy(id)?;
        let len = working.steps.len();
        let step = working
            .steps
            .get(index)
            .ok_or(EditError::InvalidIndex { index, len })?;
        working.steps[index] = patch_step(step, edit)?;
        self.commit(id, working);
        Ok(())
    }

    pub fn add_step(&mut self, id: &str, step: Step) -> Result<(), EditError> {
        let mut working = self.working_copy(id)?;
        working.steps.push(step);
        self.commit(id, working);
        Ok(())
    }

    /// Rejected when the sequence would be left with zero steps.
    pub fn delete_step(&mut self, id: &str, index: usize) -> Result<(), EditError> {
        let mut working = self.working_copy(id)?;
        let len = working.steps.len();
        if index >= len {
            return Err(EditError::InvalidIndex { index, len });
        }
        if len == 1 {
            return Err(EditError::LastStep);
        }
        working.steps.remove(index);
        self.commit(id, working);
        Ok(())
    }

    /// Relocate one step: remove at `from`, reinsert at `to`. All other
    /// steps keep their relative order.
    pub fn reorder(&mut self, id: &str, from: usize, to: usize) -> Result<(), EditError> {
        let mut working = self.working_copy(id)?;
        let len = working.steps.len();
        if from >= len {
            return Err(EditError::InvalidIndex { index: from, len });
        }
        if to >= len {
            return Err(EditError::InvalidIndex { index: to, len });
        }
        let step = working.steps.remove(from);
        working.steps.insert(to, step);
        self.commit(id, working);
        Ok(())
    }

    /// Discard staged edits, restoring the canonical sequence. Returns
    /// false when there was nothing staged.
    pub fn reset(&mut self, id: &str) -> bool {
        self.overlays.remove(id).is_some()
    }
}
