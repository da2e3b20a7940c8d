use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

use client_core::{ClientConfig, ConsoleClient, StateStore, TransportConfig};
use shared::domain::{InstrumentConfig, InstrumentKind, Step};

use crate::commands::Command;

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "benchlink", about = "Operator console for the test-execution backend")]
struct Args {
    /// Backend base url; overrides console.toml and BENCHLINK_SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(attempts) = args.max_reconnect_attempts {
        settings.max_reconnect_attempts = attempts;
    }

    let server_url = Url::parse(&settings.server_url).context("invalid server url")?;
    let store = Arc::new(StateStore::new());
    register_printers(&store);

    let client = ConsoleClient::connect(
        ClientConfig {
            server_url,
            transport: TransportConfig {
                max_reconnect_attempts: settings.max_reconnect_attempts,
                base_backoff: Duration::from_millis(settings.base_backoff_ms),
            },
        },
        Arc::clone(&store),
    )?;

    if let Err(err) = client.refresh_sequences().await {
        warn!(%err, "sequence catalog unavailable; using builtin sequences");
    }

    println!("benchlink console - type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match commands::parse(line) {
            Ok(Command::Quit) => break,
            Ok(command) => run_command(&client, command).await,
            Err(err) => println!("error: {err}"),
        }
    }
    client.shutdown();
    Ok(())
}

/// Store observers that narrate state changes on the terminal. Callbacks
/// only print; they never call back into the store.
fn register_printers(store: &Arc<StateStore>) {
    store.subscribe(
        |state| state.connection,
        |connection| {
            println!(
                "[connection] {:?} (attempts: {})",
                connection.status, connection.reconnect_attempts
            );
        },
    );
    store.subscribe(
        |state| state.test_run.clone(),
        |run| {
            if run.running {
                println!(
                    "[test] running: {}",
                    run.current_test_id.as_deref().unwrap_or("?")
                );
            } else if let Some(error) = &run.last_error {
                println!("[test] failed: {error}");
            } else {
                println!("[test] idle");
            }
        },
    );
    store.subscribe(
        |state| {
            state
                .instruments
                .values()
                .filter(|instrument| instrument.connected)
                .count()
        },
        |count| println!("[instruments] {count} connected"),
    );
}

async fn run_command(client: &ConsoleClient, command: Command) {
    match command {
        Command::Help => println!("{}", commands::HELP),
        Command::Sequences => {
            for summary in client.sequence_summaries() {
                let mut markers = String::new();
                if summary.modified {
                    markers.push_str(" [modified]");
                }
                if !summary.editable {
                    markers.push_str(" [locked]");
                }
                println!(
                    "{:24} {} ({} steps){markers}",
                    summary.id, summary.name, summary.steps
                );
            }
        }
        Command::Refresh => match client.refresh_sequences().await {
            Ok(count) => println!("fetched {count} server sequence(s)"),
            Err(err) => println!("error: {err}"),
        },
        Command::Show { id } => match client.resolve_sequence(&id) {
            Some(sequence) => {
                println!("{} - {}", sequence.name, sequence.description);
                for (n, step) in sequence.steps.iter().enumerate() {
                    println!("  {}. {}", n + 1, describe_step(step));
                }
            }
            None => println!("error: unknown sequence: {id}"),
        },
        Command::Start { id } => match client.start_test(&id).await {
            Ok(sequence) => println!(
                "dispatched {} ({} steps)",
                sequence.name,
                sequence.steps.len()
            ),
            Err(err) => println!("error: {err:#}"),
        },
        Command::Stop => match client.stop_test().await {
            Ok(()) => println!("stop requested"),
            Err(err) => println!("error: {err:#}"),
        },
        Command::Edit { id, index, edit } => {
            report_edit(client.edit_step(&id, index, edit));
        }
        Command::Add { id, kind } => {
            report_edit(client.add_step(&id, Step::default_of(kind)));
        }
        Command::Delete { id, index } => {
            report_edit(client.delete_step(&id, index));
        }
        Command::Move { id, from, to } => {
            report_edit(client.reorder_step(&id, from, to));
        }
        Command::Reset { id } => {
            if client.reset_sequence(&id) {
                println!("staged edits discarded");
            } else {
                println!("no staged edits for {id}");
            }
        }
        Command::Instruments => {
            let instruments = client.store().read(|state| {
                state.instruments.values().cloned().collect::<Vec<_>>()
            });
            if instruments.is_empty() {
                println!("no instruments registered");
            }
            for instrument in instruments {
                let readings: Vec<String> = instrument
                    .last_reading
                    .iter()
                    .map(|(metric, value)| format!("{metric}={value}"))
                    .collect();
                println!(
                    "{:16} {:?}{}{}",
                    instrument.name,
                    instrument.status,
                    if readings.is_empty() {
                        String::new()
                    } else {
                        format!("  {}", readings.join(" "))
                    },
                    instrument
                        .error
                        .map(|error| format!("  error: {error}"))
                        .unwrap_or_default()
                );
            }
        }
        Command::Connect {
            name,
            kind,
            resource,
        } => {
            let mut config = InstrumentConfig::new(kind);
            match kind {
                InstrumentKind::Daq => config.device_name = resource,
                _ => config.resource_name = resource,
            }
            match client.connect_instrument(&name, config).await {
                Ok(()) => println!("connect requested for {name}"),
                Err(err) => println!("error: {err:#}"),
            }
        }
        Command::Disconnect { name } => match client.disconnect_instrument(&name).await {
            Ok(()) => println!("{name} disconnected"),
            Err(err) => println!("error: {err:#}"),
        },
        Command::Results => {
            client.store().read(|state| {
                if state.test_results.is_empty() {
                    println!("no results for the current run");
                }
                for result in &state.test_results {
                    println!(
                        "{} {:32} {:.3}s{}",
                        if result.passed { "PASS" } else { "FAIL" },
                        result.step_name,
                        result.duration,
                        result
                            .error
                            .as_deref()
                            .map(|error| format!("  {error}"))
                            .unwrap_or_default()
                    );
                }
            });
        }
        Command::Stats => {
            let stats = client.store().test_statistics();
            println!(
                "total {}  passed {}  failed {}  pass rate {:.1}%",
                stats.total, stats.passed, stats.failed, stats.pass_rate
            );
        }
        Command::History => {
            client.store().read(|state| {
                if state.test_history.is_empty() {
                    println!("no completed runs yet");
                }
                for entry in &state.test_history {
                    println!(
                        "{}  {}  {}/{} passed",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.test_id.as_deref().unwrap_or("?"),
                        entry.statistics.passed,
                        entry.statistics.total
                    );
                }
            });
        }
        Command::Status => {
            let state = client.transport().state();
            println!(
                "connection: {:?} (attempts: {})",
                state.status, state.reconnect_attempts
            );
        }
        Command::Reconnect => {
            client.transport().reconnect();
            println!("reconnect requested");
        }
        Command::Offline => {
            client.transport().disconnect();
            println!("disconnected; automatic retry is off until 'reconnect'");
        }
        Command::Quit => {}
    }
}

fn report_edit(outcome: Result<(), client_core::EditError>) {
    match outcome {
        Ok(()) => println!("edit staged"),
        Err(err) => println!("rejected: {err}"),
    }
}

fn describe_step(step: &Step) -> String {
    match step {
        Step::PowerSupply {
            name,
            voltage,
            current_limit,
        } => format!("{name} [power_supply] {voltage}V, limit {current_limit}A"),
        Step::Measurement {
            name,
            measurement_type,
            expected_value,
            tolerance,
        } => format!("{name} [measurement] {measurement_type} expect {expected_value} +/- {tolerance}"),
        Step::Delay { name, delay_ms } => format!("{name} [delay] {delay_ms}ms"),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod commands_tests;

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod config_tests;
