//! `jobwire-watch` -- follow job lifecycle events from the command line.
//!
//! Connects to the realtime job channel, subscribes to the jobs named in
//! `WATCH_JOB_IDS`, and logs every event it receives. Exits once every
//! watched job has completed, failed, or been cancelled, or on Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable                          | Required | Default               | Description                          |
//! |-----------------------------------|----------|-----------------------|--------------------------------------|
//! | `REALTIME_BASE_URL`               | no       | `ws://localhost:8000` | Server base URL                      |
//! | `REALTIME_MAX_RECONNECT_ATTEMPTS` | no       | `5`                   | Automatic reconnects before giving up |
//! | `WATCH_JOB_IDS`                   | no       | --                    | Comma-separated job ids              |
//! | `PING_INTERVAL_SECS`              | no       | `30`                  | Seconds between keepalive pings      |
//! | `PONG_TIMEOUT_SECS`               | no       | --                    | Reconnect when a pong is this late   |

mod config;
mod report;

use std::sync::Arc;

use jobwire_core::{ServerMessage, Topic};
use jobwire_realtime::{Keepalive, RealtimeClient};
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WatchConfig;
use crate::report::{log_message, Outstanding};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobwire_watch=info,jobwire_realtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env()?;
    let client = RealtimeClient::new(config.client.clone());

    tracing::info!(
        client_id = %client.client_id(),
        endpoint = %client.endpoint(),
        jobs = config.job_ids.len(),
        "Starting jobwire-watch",
    );

    let outstanding = Arc::new(Outstanding::new(&config.job_ids));
    let finished = Arc::new(Notify::new());

    let _events = {
        let outstanding = Arc::clone(&outstanding);
        let finished = Arc::clone(&finished);
        client.subscribe(Topic::Any, move |message: &ServerMessage| {
            log_message(message);
            if outstanding.observe(message) {
                finished.notify_one();
            }
        })
    };

    // Job subscriptions live on the server per connection, so every
    // (re)connect has to repeat them.
    let _resubscribe = {
        let watcher = client.clone();
        let job_ids = config.job_ids.clone();
        client.on_connection_change(move |connected: bool| {
            if connected {
                for job_id in &job_ids {
                    watcher.subscribe_to_job(job_id.clone());
                }
            } else {
                tracing::warn!("Realtime connection lost");
            }
        })
    };

    client.connect().await?;
    let keepalive = Keepalive::spawn(client.clone(), config.keepalive.clone())?;

    if config.job_ids.is_empty() {
        tracing::info!("No WATCH_JOB_IDS given; logging all events until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            _ = finished.notified() => {
                tracing::info!("All watched jobs finished");
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!(remaining = outstanding.remaining(), "Interrupted");
            }
        }
    }

    keepalive.stop().await;
    client.disconnect().await;
    Ok(())
}
