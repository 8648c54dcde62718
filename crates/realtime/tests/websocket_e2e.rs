//! End-to-end test over a real WebSocket.
//!
//! Runs a minimal job-channel server on a loopback port with
//! `tokio-tungstenite`, then drives the production client against it.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use jobwire_core::{ClientCommand, MessageKind, ServerMessage, Topic};
use jobwire_realtime::{ClientConfig, ConnectionState, RealtimeClient};

/// Accept one client, answer `subscribe_job` with an ack followed by a
/// completion event, and report the close code the client sends.
async fn serve_one(listener: TcpListener, close_code: oneshot::Sender<CloseCode>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    let mut close_code = Some(close_code);

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                let Ok(ClientCommand::SubscribeJob { job_id }) = serde_json::from_str(&text) else {
                    continue;
                };
                let ack = serde_json::json!({
                    "type": "subscribed",
                    "job_id": job_id,
                    "message": format!("Subscribed to job {job_id}"),
                });
                let done = serde_json::json!({
                    "type": "job_completed",
                    "job_id": job_id,
                    "status": "completed",
                    "data_count": 12,
                    "results_available": true,
                    "timestamp": "2024-01-01T00:00:00",
                });
                ws.send(Message::Text(ack.to_string())).await.unwrap();
                ws.send(Message::Text(done.to_string())).await.unwrap();
            }
            Message::Close(frame) => {
                if let (Some(frame), Some(tx)) = (frame, close_code.take()) {
                    let _ = tx.send(frame.code);
                }
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn subscribe_receive_and_disconnect_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (close_tx, close_rx) = oneshot::channel();
    let server = tokio::spawn(serve_one(listener, close_tx));

    let client = RealtimeClient::new(ClientConfig::new(format!("ws://{addr}")));
    assert!(client.endpoint().starts_with(&format!("ws://{addr}/ws/")));

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let _sub = client.subscribe(Topic::Any, move |message: &ServerMessage| {
        let _ = tx.send(message.clone());
    });

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.subscribe_to_job("job-1"));

    let timeout = Duration::from_secs(5);
    let ack = tokio::time::timeout(timeout, rx.recv()).await.unwrap().unwrap();
    assert_eq!(ack.kind(), MessageKind::Subscribed);
    assert_eq!(ack.job_id(), Some("job-1"));

    let done = tokio::time::timeout(timeout, rx.recv()).await.unwrap().unwrap();
    assert_eq!(done.kind(), MessageKind::JobCompleted);
    assert!(done.is_terminal());
    assert!(done.timestamp().and_then(|ts| ts.as_datetime()).is_some());

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let code = tokio::time::timeout(timeout, close_rx).await.unwrap().unwrap();
    assert_eq!(code, CloseCode::Normal);

    let _ = tokio::time::timeout(timeout, server).await;
}
