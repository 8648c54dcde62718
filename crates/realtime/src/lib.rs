//! Realtime job-update client.
//!
//! Keeps one persistent, auto-reconnecting WebSocket connection and fans
//! inbound job lifecycle messages out to any number of independent
//! subscribers.
//!
//! - [`RealtimeClient`]: connection manager (connect, disconnect, send,
//!   exponential-backoff reconnection).
//! - [`Registry`] / [`Subscription`]: per-type and wildcard handler
//!   registration with fault-isolated dispatch.
//! - [`jobs`]: `subscribe_job` / `unsubscribe_job` and [`JobWatch`].
//! - [`Keepalive`]: optional periodic ping with an optional pong deadline.
//! - [`transport`]: the [`Connector`] seam and the WebSocket implementation.

pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod keepalive;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use client::{ConnectionState, RealtimeClient};
pub use config::ClientConfig;
pub use error::RealtimeError;
pub use jobs::JobWatch;
pub use keepalive::{Keepalive, KeepaliveConfig};
pub use reconnect::ReconnectConfig;
pub use registry::{Registry, Subscription};
pub use transport::{Connector, TransportHandle, TransportPeer, WsConnector};
