//! Application-level liveness probing.
//!
//! [`RealtimeClient::ping`] sends a single `ping` command; the server answers
//! with a `pong` message that is dispatched like any other. [`Keepalive`]
//! runs the probe on a fixed cadence and, only when configured with a
//! [`KeepaliveConfig::pong_timeout`], abandons a connection whose pong never
//! comes back so that the reconnect logic takes over.

use std::time::Duration;

use jobwire_core::ClientCommand;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::RealtimeClient;
use crate::error::RealtimeError;

/// Default interval between pings (in seconds).
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

impl RealtimeClient {
    /// Send `{type: "ping", timestamp}`. Returns `false` if not connected.
    pub fn ping(&self) -> bool {
        self.send(&ClientCommand::ping_now())
    }
}

/// Cadence and optional liveness window for [`Keepalive`].
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Time between pings.
    pub interval: Duration,
    /// Force a reconnect when a ping goes unanswered this long.
    /// `None` disables the check.
    pub pong_timeout: Option<Duration>,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            pong_timeout: None,
        }
    }
}

/// Background ping task bound to one client.
#[derive(Debug)]
pub struct Keepalive {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Keepalive {
    /// Spawn a task that pings `client` every `config.interval` while it is
    /// connected. The first ping goes out one interval after spawning.
    ///
    /// A zero interval is rejected with [`RealtimeError::InvalidConfig`].
    pub fn spawn(client: RealtimeClient, config: KeepaliveConfig) -> Result<Self, RealtimeError> {
        if config.interval.is_zero() {
            return Err(RealtimeError::InvalidConfig {
                var: "keepalive interval",
                value: format!("{:?}", config.interval),
            });
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !client.is_connected() {
                    continue;
                }

                let Some((generation, sent_at)) = client.probe() else {
                    continue;
                };
                tracing::debug!(client_id = %client.client_id(), "Keepalive ping");

                let Some(window) = config.pong_timeout else {
                    continue;
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(window) => {
                        client.expire_if_silent(generation, sent_at);
                    }
                }
            }

            tracing::debug!(client_id = %client.client_id(), "Keepalive stopped");
        });

        Ok(Self { cancel, handle })
    }

    /// Stop pinging and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Keepalive task failed");
        }
    }
}
