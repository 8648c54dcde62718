use std::time::Duration;

use jobwire_core::ClientId;

use crate::error::RealtimeError;
use crate::reconnect::ReconnectConfig;

/// Default server base URL for local development.
const DEFAULT_BASE_URL: &str = "ws://localhost:8000";

/// How long `disconnect()` waits for the close frame to be flushed.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Realtime client configuration.
///
/// Each config carries its own identity token; two clients built from two
/// configs never share an endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base URL, e.g. `ws://host:8000`.
    pub base_url: String,
    /// Identity token, generated once per config (UUID v4).
    pub client_id: ClientId,
    pub reconnect: ReconnectConfig,
    /// Upper bound on waiting for the transport to flush a close frame.
    pub close_timeout: Duration,
}

impl ClientConfig {
    /// Config for `base_url` with a fresh client id and default backoff.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: uuid::Uuid::new_v4().to_string(),
            reconnect: ReconnectConfig::default(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default               |
    /// |------------------------------------|-----------------------|
    /// | `REALTIME_BASE_URL`                | `ws://localhost:8000` |
    /// | `REALTIME_MAX_RECONNECT_ATTEMPTS`  | `5`                   |
    pub fn from_env() -> Result<Self, RealtimeError> {
        let base_url =
            std::env::var("REALTIME_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let mut config = Self::new(base_url);

        if let Ok(raw) = std::env::var("REALTIME_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts =
                raw.trim().parse().map_err(|_| RealtimeError::InvalidConfig {
                    var: "REALTIME_MAX_RECONNECT_ATTEMPTS",
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }

    /// Full endpoint address: `{base_url}/ws/{client_id}`.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/ws/{}",
            self.base_url.trim_end_matches('/'),
            self.client_id
        )
    }
}
