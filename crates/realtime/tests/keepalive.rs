//! Keepalive ping and pong-deadline tests.

mod common;

use std::time::Duration;

use jobwire_core::ClientCommand;
use jobwire_realtime::transport::Outbound;
use assert_matches::assert_matches;
use jobwire_realtime::{Keepalive, KeepaliveConfig, RealtimeError};

use common::{scripted_client, settle, wait_until, ScriptedConnector};

fn config(pong_timeout: Option<Duration>) -> KeepaliveConfig {
    KeepaliveConfig {
        interval: Duration::from_secs(10),
        pong_timeout,
    }
}

fn is_ping(json: &str) -> bool {
    matches!(
        serde_json::from_str::<ClientCommand>(json),
        Ok(ClientCommand::Ping { .. })
    )
}

// ---------------------------------------------------------------------------
// Test: pings go out on the configured interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pings_on_interval() {
    let connector = ScriptedConnector::new();
    let client = scripted_client(&connector);
    client.connect().await.unwrap();
    let mut peer = connector.take_peer();

    let keepalive = Keepalive::spawn(client.clone(), config(None)).unwrap();
    settle(Duration::from_secs(35)).await;
    keepalive.stop().await;

    let mut pings = 0;
    while let Ok(command) = peer.commands.try_recv() {
        if let Outbound::Text(json) = command {
            assert!(is_ping(&json));
            pings += 1;
        }
    }
    assert_eq!(pings, 3);
}

// ---------------------------------------------------------------------------
// Test: without a pong deadline an unanswered ping changes nothing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unanswered_ping_is_ignored_by_default() {
    let connector = ScriptedConnector::new();
    let client = scripted_client(&connector);
    client.connect().await.unwrap();
    let _peer = connector.take_peer();

    let keepalive = Keepalive::spawn(client.clone(), KeepaliveConfig {
        interval: Duration::from_secs(10),
        ..KeepaliveConfig::default()
    })
    .unwrap();
    settle(Duration::from_secs(60)).await;
    keepalive.stop().await;

    assert!(client.is_connected());
    assert_eq!(connector.open_count(), 1);
}

// ---------------------------------------------------------------------------
// Test: a missing pong forces a reconnect when a deadline is set
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_pong_forces_reconnect() {
    let connector = ScriptedConnector::new();
    let client = scripted_client(&connector);
    client.connect().await.unwrap();
    let mut silent = connector.take_peer();

    let keepalive = Keepalive::spawn(client.clone(), config(Some(Duration::from_secs(2)))).unwrap();
    wait_until(|| connector.open_count() == 2 && client.is_connected()).await;
    keepalive.stop().await;

    let mut commands = Vec::new();
    while let Ok(command) = silent.commands.try_recv() {
        commands.push(command);
    }
    assert_eq!(commands.len(), 2);
    assert!(matches!(&commands[0], Outbound::Text(json) if is_ping(json)));
    assert!(matches!(&commands[1], Outbound::Close(reason) if reason.code == 4000));
}

// ---------------------------------------------------------------------------
// Test: answered pings keep the connection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_connection() {
    let connector = ScriptedConnector::new();
    let client = scripted_client(&connector);
    client.connect().await.unwrap();
    let mut peer = connector.take_peer();

    tokio::spawn(async move {
        while let Some(command) = peer.commands.recv().await {
            if let Outbound::Text(json) = command {
                if let Ok(ClientCommand::Ping { timestamp }) = serde_json::from_str(&json) {
                    peer.push_frame(format!(r#"{{"type":"pong","timestamp":{timestamp}}}"#));
                }
            }
        }
    });

    let keepalive = Keepalive::spawn(client.clone(), config(Some(Duration::from_secs(2)))).unwrap();
    settle(Duration::from_secs(60)).await;
    keepalive.stop().await;

    assert!(client.is_connected());
    assert_eq!(connector.open_count(), 1);
}

// ---------------------------------------------------------------------------
// Test: a zero interval is rejected up front
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn zero_interval_is_rejected() {
    let connector = ScriptedConnector::new();
    let client = scripted_client(&connector);
    client.connect().await.unwrap();
    let mut peer = connector.take_peer();

    let result = Keepalive::spawn(
        client.clone(),
        KeepaliveConfig {
            interval: Duration::ZERO,
            pong_timeout: None,
        },
    );
    assert_matches!(result, Err(RealtimeError::InvalidConfig { .. }));

    settle(Duration::from_secs(5)).await;
    assert!(peer.commands.try_recv().is_err());
    assert!(client.is_connected());
}
