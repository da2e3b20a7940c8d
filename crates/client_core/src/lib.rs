//! Client runtime for the benchlink operator console.
//!
//! Wires the resilient WebSocket transport into the message dispatcher and
//! the authoritative state store, and owns the copy-on-write sequence edit
//! workspace. Rendering and the backend engine live elsewhere; this crate
//! is the part of the system with invariants worth guarding.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;
use url::Url;

use shared::domain::{ConnectionState, InstrumentConfig, Sequence, Step};
use shared::protocol::ClientCommand;

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod sequences;
pub mod store;
pub mod transport;

pub use backend::BackendApi;
pub use dispatcher::{dispatch, Dispatch};
pub use error::{BackendError, EditError, ProtocolError, TransportError};
pub use sequences::{
    builtin_sequences, SequenceSummary, SequenceWorkspace, StepEdit, DEMO_ID_PREFIX,
};
pub use store::{
    AppState, StateStore, SubscriptionId, TestHistoryEntry, TestResult, TestRun, TestStatistics,
};
pub use transport::{ReconnectPolicy, TransportConfig, WsTransport};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base url (`http://` or `https://`); the websocket endpoint
    /// is derived from it.
    pub server_url: Url,
    pub transport: TransportConfig,
}

/// The operator-facing client: one transport, one dispatcher pump, one
/// injected store, one sequence workspace.
pub struct ConsoleClient {
    store: Arc<StateStore>,
    backend: BackendApi,
    transport: WsTransport,
    sequences: Mutex<SequenceWorkspace>,
    pump: JoinHandle<()>,
    mirror: JoinHandle<()>,
}

impl ConsoleClient {
    /// Start the runtime against the configured backend. The store is
    /// constructed by the caller and injected so observers can be
    /// registered before any message arrives.
    pub fn connect(config: ClientConfig, store: Arc<StateStore>) -> Result<Self> {
        let ws_url = websocket_url(&config.server_url)?;
        let (transport, inbound) = WsTransport::connect(ws_url, config.transport.clone());
        let pump = tokio::spawn(pump_inbound(Arc::clone(&store), inbound));
        let mirror = tokio::spawn(mirror_connection_state(
            Arc::clone(&store),
            transport.subscribe_state(),
        ));
        Ok(Self {
            store,
            backend: BackendApi::new(config.server_url),
            transport,
            sequences: Mutex::new(SequenceWorkspace::new()),
            pump,
            mirror,
        })
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    pub fn transport(&self) -> &WsTransport {
        &self.transport
    }

    fn with_sequences<R>(&self, f: impl FnOnce(&mut SequenceWorkspace) -> R) -> R {
        let mut workspace = self
            .sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut workspace)
    }

    /// Pull the server catalog and replace the workspace's server
    /// sequences. Staged overlays survive the refresh.
    pub async fn refresh_sequences(&self) -> Result<usize, BackendError> {
        let sequences = self.backend.fetch_sequences().await?;
        let count = sequences.len();
        self.with_sequences(|workspace| workspace.set_server_sequences(sequences));
        Ok(count)
    }

    pub fn sequence_summaries(&self) -> Vec<SequenceSummary> {
        self.with_sequences(|workspace| workspace.summaries())
    }

    pub fn resolve_sequence(&self, id: &str) -> Option<Sequence> {
        self.with_sequences(|workspace| workspace.resolve(id))
    }

    pub fn edit_step(&self, id: &str, index: usize, edit: StepEdit) -> Result<(), EditError> {
        self.with_sequences(|workspace| workspace.edit_step(id, index, edit))
    }

    pub fn add_step(&self, id: &str, step: Step) -> Result<(), EditError> {
        self.with_sequences(|workspace| workspace.add_step(id, step))
    }

    pub fn delete_step(&self, id: &str, index: usize) -> Result<(), EditError> {
        self.with_sequences(|workspace| workspace.delete_step(id, index))
    }

    pub fn reorder_step(&self, id: &str, from: usize, to: usize) -> Result<(), EditError> {
        self.with_sequences(|workspace| workspace.reorder(id, from, to))
    }

    pub fn reset_sequence(&self, id: &str) -> bool {
        self.with_sequences(|workspace| workspace.reset(id))
    }

    /// Resolve the sequence (overlay over canonical) and dispatch it to
    /// the backend. The resolved sequence is returned so the console can
    /// show what was actually sent.
    pub async fn start_test(&self, sequence_id: &str) -> Result<Sequence> {
        let sequence = self
            .resolve_sequence(sequence_id)
            .ok_or_else(|| anyhow!("unknown sequence: {sequence_id}"))?;
        let command = ClientCommand::StartTest {
            sequence: sequence.clone(),
        };
        if !self.transport.send(&command).await {
            bail!("not connected; start_test was not sent");
        }
        Ok(sequence)
    }

    pub async fn stop_test(&self) -> Result<()> {
        if !self.transport.send(&ClientCommand::StopTest).await {
            bail!("not connected; stop_test was not sent");
        }
        Ok(())
    }

    /// Ask the backend to bring the instrument up, then register it in the
    /// store as an explicit add (disconnected until a status push says
    /// otherwise).
    pub async fn connect_instrument(&self, name: &str, config: InstrumentConfig) -> Result<()> {
        self.backend
            .connect_instrument(name, &config)
            .await
            .with_context(|| format!("failed to connect instrument {name}"))?;
        self.store.add_instrument(name, config);
        Ok(())
    }

    pub async fn disconnect_instrument(&self, name: &str) -> Result<()> {
        self.backend
            .disconnect_instrument(name)
            .await
            .with_context(|| format!("failed to disconnect instrument {name}"))?;
        self.store.remove_instrument(name);
        Ok(())
    }

    pub fn shutdown(self) {
        self.pump.abort();
        self.mirror.abort();
    }
}

/// Drain the inbound stream in arrival order. Dispatch failures are
/// diagnostics, never fatal. When a run finishes (completed or errored)
/// its summary is appended to the bounded history.
async fn pump_inbound(store: Arc<StateStore>, mut inbound: mpsc::UnboundedReceiver<Value>) {
    while let Some(raw) = inbound.recv().await {
        let active_test = store.read(|state| {
            state
                .test_run
                .running
                .then(|| state.test_run.current_test_id.clone())
        });
        match dispatcher::dispatch(&store, &raw) {
            Ok(Dispatch::TestCompleted | Dispatch::TestFailed) => {
                if let Some(test_id) = active_test {
                    let statistics = store.test_statistics();
                    store.save_test_to_history(TestHistoryEntry::finished(test_id, statistics));
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "dropping inbound message"),
        }
    }
}

async fn mirror_connection_state(
    store: Arc<StateStore>,
    mut states: watch::Receiver<ConnectionState>,
) {
    store.set_connection_status(*states.borrow_and_update());
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        store.set_connection_status(state);
    }
}

/// Derive the websocket endpoint from the backend base url.
fn websocket_url(server_url: &Url) -> Result<Url> {
    let raw = server_url.as_str();
    let ws = if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        bail!("server url must start with http:// or https://");
    };
    let ws = ws.trim_end_matches('/');
    Url::parse(&format!("{ws}/ws")).context("invalid websocket url")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod dispatcher_tests;

#[cfg(test)]
#[path = "tests/sequence_tests.rs"]
mod sequence_tests;

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod transport_tests;

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod backend_tests;
