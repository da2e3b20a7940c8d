//! Line-oriented command language for the operator console.

use client_core::StepEdit;
use shared::domain::{InstrumentKind, StepKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Sequences,
    Refresh,
    Show {
        id: String,
    },
    Start {
        id: String,
    },
    Stop,
    Edit {
        id: String,
        index: usize,
        edit: StepEdit,
    },
    Add {
        id: String,
        kind: StepKind,
    },
    Delete {
        id: String,
        index: usize,
    },
    Move {
        id: String,
        from: usize,
        to: usize,
    },
    Reset {
        id: String,
    },
    Instruments,
    Connect {
        name: String,
        kind: InstrumentKind,
        resource: Option<String>,
    },
    Disconnect {
        name: String,
    },
    Results,
    Stats,
    History,
    Status,
    Reconnect,
    Offline,
    Quit,
}

pub const HELP: &str = "\
sequences                          list the sequence catalog
refresh                            re-fetch server sequences
show <id>                          print a sequence with staged edits
start <id> | stop                  run control
edit <id> <step> <field> <value>   stage a field edit (1-based step)
add <id> <kind>                    append a default step (power_supply|measurement|delay)
del <id> <step>                    delete a step
move <id> <from> <to>              relocate a step
reset <id>                         discard staged edits
instruments                        list instruments
connect <name> <kind> [resource]   bring an instrument up
disconnect <name>                  take an instrument down
results | stats | history          inspect the current run and past runs
status                             connection state
reconnect | offline                transport control
quit                               exit";

pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let keyword = words.next().ok_or("empty command")?;
    let rest: Vec<&str> = words.collect();

    match (keyword, rest.as_slice()) {
        ("help", []) => Ok(Command::Help),
        ("sequences", []) => Ok(Command::Sequences),
        ("refresh", []) => Ok(Command::Refresh),
        ("show", [id]) => Ok(Command::Show { id: id.to_string() }),
        ("start", [id]) => Ok(Command::Start { id: id.to_string() }),
        ("stop", []) => Ok(Command::Stop),
        ("edit", [id, step, field, value @ ..]) if !value.is_empty() => {
            let index = step_index(step)?;
            let edit = step_edit(field, &value.join(" "))?;
            Ok(Command::Edit {
                id: id.to_string(),
                index,
                edit,
            })
        }
        ("add", [id, kind]) => Ok(Command::Add {
            id: id.to_string(),
            kind: step_kind(kind)?,
        }),
        ("del", [id, step]) => Ok(Command::Delete {
            id: id.to_string(),
            index: step_index(step)?,
        }),
        ("move", [id, from, to]) => Ok(Command::Move {
            id: id.to_string(),
            from: step_index(from)?,
            to: step_index(to)?,
        }),
        ("reset", [id]) => Ok(Command::Reset { id: id.to_string() }),
        ("instruments", []) => Ok(Command::Instruments),
        ("connect", [name, kind]) => Ok(Command::Connect {
            name: name.to_string(),
            kind: instrument_kind(kind)?,
            resource: None,
        }),
        ("connect", [name, kind, resource]) => Ok(Command::Connect {
            name: name.to_string(),
            kind: instrument_kind(kind)?,
            resource: Some(resource.to_string()),
        }),
        ("disconnect", [name]) => Ok(Command::Disconnect {
            name: name.to_string(),
        }),
        ("results", []) => Ok(Command::Results),
        ("stats", []) => Ok(Command::Stats),
        ("history", []) => Ok(Command::History),
        ("status", []) => Ok(Command::Status),
        ("reconnect", []) => Ok(Command::Reconnect),
        ("offline", []) => Ok(Command::Offline),
        ("quit", []) | ("exit", []) => Ok(Command::Quit),
        (keyword, _) => Err(format!(
            "unrecognized command or arguments: {keyword} (try 'help')"
        )),
    }
}

/// Steps are addressed 1-based on the command line.
fn step_index(raw: &str) -> Result<usize, String> {
    let n: usize = raw
        .parse()
        .map_err(|_| format!("expected a step number, got {raw}"))?;
    if n == 0 {
        return Err("steps are numbered from 1".to_string());
    }
    Ok(n - 1)
}

fn step_edit(field: &str, value: &str) -> Result<StepEdit, String> {
    let number = |value: &str| -> Result<f64, String> {
        value
            .parse()
            .map_err(|_| format!("{field} expects a number, got {value}"))
    };
    match field {
        "name" => Ok(StepEdit::Name(value.to_string())),
        "voltage" => Ok(StepEdit::Voltage(number(value)?)),
        "current_limit" => Ok(StepEdit::CurrentLimit(number(value)?)),
        "measurement_type" => Ok(StepEdit::MeasurementType(value.to_string())),
        "expected_value" => Ok(StepEdit::ExpectedValue(number(value)?)),
        "tolerance" => Ok(StepEdit::Tolerance(number(value)?)),
        "delay_ms" => value
            .parse()
            .map(StepEdit::DelayMs)
            .map_err(|_| format!("delay_ms expects milliseconds, got {value}")),
        other => Err(format!("unknown field: {other}")),
    }
}

fn step_kind(raw: &str) -> Result<StepKind, String> {
    match raw {
        "power_supply" => Ok(StepKind::PowerSupply),
        "measurement" => Ok(StepKind::Measurement),
        "delay" => Ok(StepKind::Delay),
        other => Err(format!("unknown step kind: {other}")),
    }
}

fn instrument_kind(raw: &str) -> Result<InstrumentKind, String> {
    match raw {
        "power_supply" => Ok(InstrumentKind::PowerSupply),
        "daq" => Ok(InstrumentKind::Daq),
        "multimeter" => Ok(InstrumentKind::Multimeter),
        "oscilloscope" => Ok(InstrumentKind::Oscilloscope),
        "signal_generator" => Ok(InstrumentKind::SignalGenerator),
        other => Err(format!("unknown instrument kind: {other}")),
    }
}
