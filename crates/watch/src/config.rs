use std::time::Duration;

use anyhow::Context;
use jobwire_core::JobId;
use jobwire_realtime::{ClientConfig, KeepaliveConfig};

/// Default interval between keepalive pings.
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Settings for one `jobwire-watch` run.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub client: ClientConfig,
    /// Jobs to subscribe to. Empty means "log everything until Ctrl-C".
    pub job_ids: Vec<JobId>,
    pub keepalive: KeepaliveConfig,
}

impl WatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default | Description                              |
    /// |----------------------|---------|------------------------------------------|
    /// | `WATCH_JOB_IDS`      | (none)  | Comma-separated job ids to subscribe to  |
    /// | `PING_INTERVAL_SECS` | `30`    | Seconds between keepalive pings          |
    /// | `PONG_TIMEOUT_SECS`  | (off)   | Reconnect if a ping goes unanswered      |
    ///
    /// `REALTIME_BASE_URL` and `REALTIME_MAX_RECONNECT_ATTEMPTS` are read by
    /// [`ClientConfig::from_env`].
    pub fn from_env() -> anyhow::Result<Self> {
        let client = ClientConfig::from_env()?;

        let job_ids = std::env::var("WATCH_JOB_IDS")
            .map(|raw| parse_job_ids(&raw))
            .unwrap_or_default();

        let interval_secs = match std::env::var("PING_INTERVAL_SECS") {
            Ok(raw) => parse_interval_secs(&raw)?,
            Err(_) => DEFAULT_PING_INTERVAL_SECS,
        };

        let pong_timeout = match std::env::var("PONG_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(parse_secs("PONG_TIMEOUT_SECS", &raw)?)),
            Err(_) => None,
        };

        Ok(Self {
            client,
            job_ids,
            keepalive: KeepaliveConfig {
                interval: Duration::from_secs(interval_secs),
                pong_timeout,
            },
        })
    }
}

/// Parse a whole-seconds value read from `var`.
fn parse_secs(var: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{var} must be whole seconds, got {raw:?}"))
}

/// Parse `PING_INTERVAL_SECS`, which must be at least one second.
fn parse_interval_secs(raw: &str) -> anyhow::Result<u64> {
    let secs = parse_secs("PING_INTERVAL_SECS", raw)?;
    anyhow::ensure!(secs > 0, "PING_INTERVAL_SECS must be at least 1, got {raw:?}");
    Ok(secs)
}

/// Split a comma-separated id list, dropping blanks and duplicates.
pub fn parse_job_ids(raw: &str) -> Vec<JobId> {
    let mut ids: Vec<JobId> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_trimmed_and_deduplicated() {
        assert_eq!(parse_job_ids(" a, b,,a ,c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn ping_interval_must_be_positive_whole_seconds() {
        assert_eq!(parse_interval_secs(" 15 ").unwrap(), 15);
        assert!(parse_interval_secs("0").is_err());
        assert!(parse_interval_secs("ten").is_err());
    }

    #[test]
    fn pong_timeout_rejects_garbage() {
        assert_eq!(parse_secs("PONG_TIMEOUT_SECS", "5").unwrap(), 5);
        let err = parse_secs("PONG_TIMEOUT_SECS", "5s").unwrap_err();
        assert!(err.to_string().contains("PONG_TIMEOUT_SECS"));
    }

    #[test]
    fn empty_list_yields_no_ids() {
        assert!(parse_job_ids("").is_empty());
        assert!(parse_job_ids(" , ").is_empty());
    }
}
