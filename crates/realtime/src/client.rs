//! Realtime client: one auto-reconnecting transport shared by many
//! subscribers.
//!
//! [`RealtimeClient`] owns the transport exclusively. Callers connect once,
//! register handlers through the [`Registry`], and issue commands with
//! [`RealtimeClient::send`]; they never see the socket.
//!
//! # Lifecycle
//!
//! ```text
//!              connect()                 open ok
//! Disconnected ─────────► Connecting ───────────────► Connected
//!      ▲                    │  ▲                          │
//!      │   open failed      │  │ backoff elapsed          │ abnormal close
//!      ├────────────────────┘  │                          ▼
//!      │   attempts exhausted  └────────────────── ReconnectPending
//!      ├───────────────────────────────────────────────────┘
//!      │   disconnect()
//!      └──────────────── Closing ◄──── (any state)
//! ```
//!
//! Every transport is tagged with a generation number. `disconnect()` and
//! every new attempt bump the generation, so close events, frames and
//! reconnect timers belonging to a discarded transport are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use jobwire_core::{parse_message, ClientCommand, ServerMessage, Topic};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::RealtimeError;
use crate::registry::{Registry, Subscription};
use crate::transport::{
    CloseReason, Connector, Outbound, TransportEvent, TransportHandle, WsConnector,
};

/// Close code used when the client abandons a silent transport.
const CLOSE_PONG_TIMEOUT: u16 = 4000;

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state; also terminal after `disconnect()` or after automatic
    /// reconnection gave up.
    Disconnected,
    Connecting,
    Connected,
    /// `disconnect()` is flushing the close frame.
    Closing,
    /// Waiting out the backoff before the next automatic attempt.
    ReconnectPending,
}

/// One shared connection attempt. Every concurrent `connect()` caller awaits
/// the same instance.
type Attempt = Shared<BoxFuture<'static, Result<(), RealtimeError>>>;

/// Who started an attempt. Only scheduled reconnects keep retrying on
/// failure; a caller's attempt reports the error and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Reconnect,
}

enum Phase {
    Disconnected,
    Connecting { attempt: Attempt },
    Connected { outbound: mpsc::UnboundedSender<Outbound> },
    Closing,
    ReconnectPending { cancel: CancellationToken },
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Connected { .. } => ConnectionState::Connected,
            Self::Closing => ConnectionState::Closing,
            Self::ReconnectPending { .. } => ConnectionState::ReconnectPending,
        }
    }
}

struct Machine {
    phase: Phase,
    generation: u64,
    attempts: u32,
    backoff: Duration,
    last_pong: Option<Instant>,
}

struct Inner {
    config: ClientConfig,
    endpoint: String,
    connector: Arc<dyn Connector>,
    registry: Registry,
    machine: Mutex<Machine>,
    /// Last connection state handed to connection handlers. Held while
    /// notifying so that notifications are never reordered.
    published: Mutex<bool>,
}

/// Handle to a realtime client. Cheap to clone; clones share one
/// connection and one handler registry.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Client over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WsConnector)
    }

    /// Client over a custom transport.
    pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Self {
        let endpoint = config.endpoint();
        let backoff = config.reconnect.initial_delay;
        Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                connector: Arc::new(connector),
                registry: Registry::new(),
                machine: Mutex::new(Machine {
                    phase: Phase::Disconnected,
                    generation: 0,
                    attempts: 0,
                    backoff,
                    last_pong: None,
                }),
                published: Mutex::new(false),
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock_machine().phase.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Automatic reconnection attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock_machine().attempts
    }

    /// Delay the next automatic reconnection would wait.
    pub fn current_backoff(&self) -> Duration {
        self.inner.lock_machine().backoff
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Open the connection.
    ///
    /// Returns immediately when already connected. When an attempt is in
    /// flight, waits for that attempt instead of starting another. A pending
    /// automatic reconnect is cancelled and replaced by this attempt.
    ///
    /// An establishment failure is returned to every waiting caller and
    /// leaves the client `Disconnected`; no automatic retry follows.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        let attempt = {
            let mut machine = self.inner.lock_machine();
            let in_flight = match &machine.phase {
                Phase::Connected { .. } => return Ok(()),
                Phase::Connecting { attempt } => Some(attempt.clone()),
                _ => None,
            };
            match in_flight {
                Some(attempt) => attempt,
                None => self.inner.begin_attempt(&mut machine, Origin::Caller),
            }
        };
        attempt.await
    }

    /// Close the connection with a normal-closure code.
    ///
    /// Cancels any pending reconnect, clears every handler registered before
    /// the call, and leaves the client `Disconnected` unless a `connect()`
    /// started while the close frame was flushing. Close events for the discarded
    /// transport that arrive later are ignored, so no reconnect follows.
    pub async fn disconnect(&self) {
        let (outbound, generation) = {
            let mut machine = self.inner.lock_machine();
            machine.generation += 1;
            let outbound = match std::mem::replace(&mut machine.phase, Phase::Closing) {
                Phase::Connected { outbound } => Some(outbound),
                Phase::ReconnectPending { cancel } => {
                    cancel.cancel();
                    None
                }
                Phase::Connecting { .. } | Phase::Disconnected | Phase::Closing => None,
            };
            (outbound, machine.generation)
        };

        self.inner.publish_connection_state();
        // Handlers registered during the flush wait belong to the next session.
        self.inner.registry.clear();

        if let Some(outbound) = outbound {
            tracing::info!(client_id = %self.client_id(), "Closing realtime connection");
            if outbound.send(Outbound::Close(CloseReason::normal())).is_ok() {
                let flushed =
                    tokio::time::timeout(self.inner.config.close_timeout, outbound.closed()).await;
                if flushed.is_err() {
                    tracing::warn!(
                        client_id = %self.client_id(),
                        "Timed out waiting for close frame to flush",
                    );
                }
            }
        }

        {
            let mut machine = self.inner.lock_machine();
            if machine.generation == generation {
                machine.phase = Phase::Disconnected;
            }
        }

        tracing::info!(client_id = %self.client_id(), "Realtime client disconnected");
    }

    /// Send a command if connected.
    ///
    /// Returns `false` (and logs a warning) when there is no open transport.
    /// Commands are never queued for later delivery.
    pub fn send(&self, command: &ClientCommand) -> bool {
        let machine = self.inner.lock_machine();
        let Phase::Connected { outbound } = &machine.phase else {
            tracing::warn!(
                command = command.kind(),
                state = ?machine.phase.state(),
                "Dropping command: realtime client is not connected",
            );
            return false;
        };

        let json = match command.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(command = command.kind(), error = %e, "Failed to encode command");
                return false;
            }
        };

        if outbound.send(Outbound::Text(json)).is_err() {
            tracing::warn!(command = command.kind(), "Transport writer has gone away");
            return false;
        }
        tracing::debug!(command = command.kind(), "Command sent");
        true
    }

    /// Register `handler` for messages matching `topic`.
    ///
    /// Handlers run on the connection's dispatch task, one message at a
    /// time, in arrival order.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(topic.into(), Arc::new(handler))
    }

    /// Register `handler` for connection-state changes. Called with `true`
    /// when the connection opens and `false` when it stops being open.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner.registry.on_connection_change(Arc::new(handler))
    }

    /// Send a ping and return the generation it was sent on.
    pub(crate) fn probe(&self) -> Option<(u64, Instant)> {
        let sent_at = Instant::now();
        let generation = self.inner.lock_machine().generation;
        self.send(&ClientCommand::ping_now())
            .then_some((generation, sent_at))
    }

    /// Abandon the transport of `generation` if no pong has arrived since
    /// `sent_at`. Returns whether the transport was abandoned.
    pub(crate) fn expire_if_silent(&self, generation: u64, sent_at: Instant) -> bool {
        let mut machine = self.inner.lock_machine();
        if machine.generation != generation {
            return false;
        }
        if machine.last_pong.is_some_and(|at| at >= sent_at) {
            return false;
        }
        let outbound = match std::mem::replace(&mut machine.phase, Phase::Disconnected) {
            Phase::Connected { outbound } => outbound,
            other => {
                machine.phase = other;
                return false;
            }
        };

        tracing::warn!(
            client_id = %self.inner.config.client_id,
            "No pong received in time; forcing reconnect",
        );
        let _ = outbound.send(Outbound::Close(CloseReason {
            code: CLOSE_PONG_TIMEOUT,
            reason: "pong timeout".into(),
        }));
        // The old transport's close event must not be handled again.
        machine.generation += 1;
        self.inner.schedule_reconnect(&mut machine);
        drop(machine);

        self.inner.publish_connection_state();
        true
    }
}

impl Inner {
    fn lock_machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new transport attempt and move to `Connecting`.
    fn begin_attempt(self: &Arc<Self>, machine: &mut Machine, origin: Origin) -> Attempt {
        if let Phase::ReconnectPending { cancel } = &machine.phase {
            cancel.cancel();
        }

        machine.generation += 1;
        let generation = machine.generation;

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.establish(generation, origin).await });
        let attempt: Attempt = async move {
            task.await
                .unwrap_or_else(|e| Err(RealtimeError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared();

        machine.phase = Phase::Connecting {
            attempt: attempt.clone(),
        };
        attempt
    }

    async fn establish(self: Arc<Self>, generation: u64, origin: Origin) -> Result<(), RealtimeError> {
        tracing::info!(
            client_id = %self.config.client_id,
            endpoint = %self.endpoint,
            ?origin,
            "Connecting to realtime endpoint",
        );

        let TransportHandle { outbound, inbound } = match self.connector.open(&self.endpoint).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(client_id = %self.config.client_id, error = %e, "Connection attempt failed");
                {
                    let mut machine = self.lock_machine();
                    if machine.generation == generation
                        && matches!(machine.phase, Phase::Connecting { .. })
                    {
                        match origin {
                            Origin::Caller => machine.phase = Phase::Disconnected,
                            Origin::Reconnect => self.schedule_reconnect(&mut machine),
                        }
                    }
                }
                self.publish_connection_state();
                return Err(e);
            }
        };

        {
            let mut machine = self.lock_machine();
            if machine.generation != generation || !matches!(machine.phase, Phase::Connecting { .. })
            {
                tracing::debug!(generation, "Connection attempt superseded; closing new transport");
                let _ = outbound.send(Outbound::Close(CloseReason::normal()));
                return Err(RealtimeError::Cancelled);
            }
            machine.phase = Phase::Connected { outbound };
            machine.attempts = 0;
            machine.backoff = self.config.reconnect.initial_delay;
            machine.last_pong = None;
        }

        tracing::info!(client_id = %self.config.client_id, "Realtime connection established");
        self.publish_connection_state();
        tokio::spawn(Arc::clone(&self).pump(generation, inbound));
        Ok(())
    }

    /// Read one transport's events in order until it closes.
    async fn pump(self: Arc<Self>, generation: u64, mut inbound: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Frame(text) => {
                    if self.lock_machine().generation != generation {
                        tracing::trace!(generation, "Dropping frame from superseded transport");
                        continue;
                    }
                    self.handle_frame(&text);
                }
                TransportEvent::Closed(reason) => {
                    self.handle_close(generation, reason);
                    return;
                }
            }
        }
        self.handle_close(generation, CloseReason::abnormal("transport dropped"));
    }

    fn handle_frame(&self, text: &str) {
        let message = match parse_message(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %text, "Dropping unparsable frame");
                return;
            }
        };

        if let ServerMessage::Pong(_) = message {
            self.lock_machine().last_pong = Some(Instant::now());
        }

        tracing::trace!(kind = %message.kind(), job_id = message.job_id(), "Dispatching message");
        self.registry.dispatch(&message);
    }

    fn handle_close(self: &Arc<Self>, generation: u64, reason: CloseReason) {
        {
            let mut machine = self.lock_machine();
            if machine.generation != generation || !matches!(machine.phase, Phase::Connected { .. }) {
                tracing::debug!(
                    generation,
                    code = reason.code,
                    "Ignoring close of superseded transport",
                );
                return;
            }

            if reason.is_normal() {
                tracing::info!(client_id = %self.config.client_id, "Realtime connection closed by server");
                machine.phase = Phase::Disconnected;
            } else {
                tracing::warn!(
                    client_id = %self.config.client_id,
                    code = reason.code,
                    reason = %reason.reason,
                    "Realtime connection lost",
                );
                self.schedule_reconnect(&mut machine);
            }
        }
        self.publish_connection_state();
    }

    /// Schedule the next automatic attempt, or give up once the attempt
    /// budget is spent.
    fn schedule_reconnect(self: &Arc<Self>, machine: &mut Machine) {
        let policy = &self.config.reconnect;
        if policy.is_exhausted(machine.attempts) {
            tracing::error!(
                client_id = %self.config.client_id,
                attempts = machine.attempts,
                "Giving up on automatic reconnection; call connect() to resume",
            );
            machine.phase = Phase::Disconnected;
            return;
        }

        machine.attempts += 1;
        let delay = machine.backoff;
        machine.backoff = policy.next_delay(delay);

        let cancel = CancellationToken::new();
        machine.phase = Phase::ReconnectPending {
            cancel: cancel.clone(),
        };

        tracing::info!(
            client_id = %self.config.client_id,
            attempt = machine.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect",
        );

        let generation = machine.generation;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.fire_reconnect(generation),
            }
        });
    }

    fn fire_reconnect(self: &Arc<Self>, generation: u64) {
        let mut machine = self.lock_machine();
        if machine.generation != generation
            || !matches!(machine.phase, Phase::ReconnectPending { .. })
        {
            return;
        }
        // The attempt runs on its own task; nobody needs to await it here.
        let _attempt = self.begin_attempt(&mut machine, Origin::Reconnect);
    }

    /// Tell connection handlers about a change between open and not open.
    fn publish_connection_state(&self) {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        let connected = matches!(self.lock_machine().phase, Phase::Connected { .. });
        if *published != connected {
            *published = connected;
            self.registry.notify_connection(connected);
        }
    }
}
