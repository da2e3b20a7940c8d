//! Auto-reconnecting WebSocket transport.
//!
//! One spawned task owns the physical socket for its whole lifetime and is
//! the only place connection state changes. The task is driven by a command
//! channel (`send`/`disconnect`/`reconnect`), publishes state through a
//! watch channel, faults through a broadcast channel, and delivers parsed
//! inbound frames on a single mpsc stream in arrival order.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};
use url::Url;

use shared::domain::{ConnectionState, ConnectionStatus};
use shared::protocol::ClientCommand;

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_reconnect_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            base_backoff: Duration::from_millis(1000),
        }
    }
}

/// Exponential backoff schedule: `base * 2^n` for the nth automatic
/// attempt, no jitter, uncapped until the attempt cap is reached.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    base: Duration,
}

impl ReconnectPolicy {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            base: config.base_backoff,
        }
    }

    /// Delay before the next automatic attempt, or None once the cap is
    /// reached.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        Some(self.base.saturating_mul(2u32.saturating_pow(self.attempts)))
    }

    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

enum TransportCommand {
    Send {
        frame: String,
        done: oneshot::Sender<bool>,
    },
    Disconnect,
    Reconnect,
}

/// Handle to the connection task.
///
/// Dropping the handle closes the command channel; the task sends a clean
/// close if connected and exits, cancelling any pending backoff.
pub struct WsTransport {
    commands: mpsc::UnboundedSender<TransportCommand>,
    state: watch::Receiver<ConnectionState>,
    faults: broadcast::Sender<TransportError>,
}

impl WsTransport {
    /// Spawn the connection task against `url` and return the handle plus
    /// the single inbound message stream. Initial state is `connecting`.
    pub fn connect(url: Url, config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::new(ConnectionStatus::Connecting));
        let (fault_tx, _) = broadcast::channel(64);

        let task = ConnectionTask {
            url,
            policy: ReconnectPolicy::new(&config),
            commands: command_rx,
            inbound: inbound_tx,
            state: state_tx,
            faults: fault_tx.clone(),
        };
        tokio::spawn(task.run());

        (
            Self {
                commands: command_tx,
                state: state_rx,
                faults: fault_tx,
            },
            inbound_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe_faults(&self) -> broadcast::Receiver<TransportError> {
        self.faults.subscribe()
    }

    /// Serialize and send a command. Returns false without queueing when
    /// the transport is not in the connected state, when serialization
    /// fails, or when the socket write fails.
    pub async fn send(&self, command: &ClientCommand) -> bool {
        if self.state().status != ConnectionStatus::Connected {
            debug!("send refused: transport not connected");
            return false;
        }
        let frame = match serde_json::to_string(command) {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "failed to serialize outbound command");
                return false;
            }
        };
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .commands
            .send(TransportCommand::Send {
                frame,
                done: done_tx,
            })
            .is_err()
        {
            return false;
        }
        done_rx.await.unwrap_or(false)
    }

    /// User-initiated close: transitions to `disconnected`, cancels any
    /// pending reconnect, and suppresses the automatic retry path.
    pub fn disconnect(&self) {
        let _ = self.commands.send(TransportCommand::Disconnect);
    }

    /// Manual restart: resets the attempt counter and reconnects
    /// unconditionally, from any state including `failed`.
    pub fn reconnect(&self) {
        let _ = self.commands.send(TransportCommand::Reconnect);
    }
}

enum SessionEnd {
    UserDisconnect,
    ManualReconnect,
    Lost(String),
    Shutdown,
}

enum BackoffOutcome {
    Elapsed,
    Cancelled,
    Restart,
    Shutdown,
}

struct ConnectionTask {
    url: Url,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    inbound: mpsc::UnboundedSender<Value>,
    state: watch::Sender<ConnectionState>,
    faults: broadcast::Sender<TransportError>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            self.publish(ConnectionStatus::Connecting);
            match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    self.policy.reset();
                    self.publish(ConnectionStatus::Connected);
                    match self.drive(socket).await {
                        SessionEnd::UserDisconnect => {
                            self.publish(ConnectionStatus::Disconnected);
                            if !self.await_manual_restart().await {
                                return;
                            }
                        }
                        SessionEnd::ManualReconnect => {
                            self.policy.reset();
                        }
                        SessionEnd::Lost(reason) => {
                            self.fault(TransportError::UnexpectedClose(reason));
                            self.publish(ConnectionStatus::Disconnected);
                            if !self.backoff().await {
                                return;
                            }
                        }
                        SessionEnd::Shutdown => return,
                    }
                }
                Err(err) => {
                    self.fault(TransportError::Connect(err.to_string()));
                    self.publish(ConnectionStatus::Error);
                    self.publish(ConnectionStatus::Disconnected);
                    if !self.backoff().await {
                        return;
                    }
                }
            }
        }
    }

    /// Pump one established socket until it ends. The select keeps frame
    /// delivery and command handling on a single task, so inbound handling
    /// order equals arrival order.
    async fn drive(&mut self, socket: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(&text),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Lost(reason);
                    }
                    // Pings are answered by tungstenite; binary frames are
                    // not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        // Transient error state, raised alongside the
                        // disconnected transition that follows.
                        self.publish(ConnectionStatus::Error);
                        return SessionEnd::Lost(err.to_string());
                    }
                    None => return SessionEnd::Lost("stream ended".to_string()),
                },
                command = self.commands.recv() => match command {
                    Some(TransportCommand::Send { frame, done }) => {
                        match sink.send(Message::Text(frame)).await {
                            Ok(()) => {
                                let _ = done.send(true);
                            }
                            Err(err) => {
                                self.fault(TransportError::Send(err.to_string()));
                                let _ = done.send(false);
                                self.publish(ConnectionStatus::Error);
                                return SessionEnd::Lost(err.to_string());
                            }
                        }
                    }
                    Some(TransportCommand::Disconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::UserDisconnect;
                    }
                    Some(TransportCommand::Reconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::ManualReconnect;
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }

    /// A frame that fails to parse is reported and dropped; it never
    /// closes the connection or changes connection state.
    fn deliver(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                if self.inbound.send(value).is_err() {
                    debug!("inbound receiver dropped; frame discarded");
                }
            }
            Err(err) => {
                warn!(%err, "dropping unparseable frame");
                self.fault(TransportError::Parse(err.to_string()));
            }
        }
    }

    /// Wait out the backoff delay for the next automatic attempt, or park
    /// in the terminal `failed` state once the cap is reached. Returns
    /// false when the task should exit.
    async fn backoff(&mut self) -> bool {
        let Some(delay) = self.policy.next_delay() else {
            warn!(
                attempts = self.policy.attempts(),
                "reconnect attempts exhausted"
            );
            self.publish(ConnectionStatus::Failed);
            return self.await_manual_restart().await;
        };
        debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        match self.sleep_or_command(delay).await {
            BackoffOutcome::Elapsed => {
                self.policy.record_attempt();
                true
            }
            BackoffOutcome::Cancelled => {
                self.publish(ConnectionStatus::Disconnected);
                self.await_manual_restart().await
            }
            BackoffOutcome::Restart => {
                self.policy.reset();
                true
            }
            BackoffOutcome::Shutdown => false,
        }
    }

    /// The pending reconnect sleep is the only cancellable scheduled
    /// operation: `disconnect` cancels it, `reconnect` restarts the cycle
    /// immediately, teardown drops it.
    async fn sleep_or_command(&mut self, delay: Duration) -> BackoffOutcome {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return BackoffOutcome::Elapsed,
                command = self.commands.recv() => match command {
                    Some(TransportCommand::Send { done, .. }) => {
                        let _ = done.send(false);
                    }
                    Some(TransportCommand::Disconnect) => return BackoffOutcome::Cancelled,
                    Some(TransportCommand::Reconnect) => return BackoffOutcome::Restart,
                    None => return BackoffOutcome::Shutdown,
                }
            }
        }
    }

    /// Parked after a user disconnect or in the terminal `failed` state;
    /// only a manual `reconnect` resumes the cycle. Returns false when the
    /// handle was dropped.
    async fn await_manual_restart(&mut self) -> bool {
        while let Some(command) = self.commands.recv().await {
            match command {
                TransportCommand::Send { done, .. } => {
                    let _ = done.send(false);
                }
                TransportCommand::Disconnect => self.publish(ConnectionStatus::Disconnected),
                TransportCommand::Reconnect => {
                    self.policy.reset();
                    return true;
                }
            }
        }
        false
    }

    fn publish(&self, status: ConnectionStatus) {
        let _ = self.state.send(ConnectionState {
            status,
            reconnect_attempts: self.policy.attempts(),
        });
    }

    fn fault(&self, fault: TransportError) {
        warn!(%fault, "transport fault");
        let _ = self.faults.send(fault);
    }
}
