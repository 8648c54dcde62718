#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use jobwire_realtime::{
    ClientConfig, Connector, RealtimeClient, RealtimeError, TransportHandle, TransportPeer,
};

/// What the scripted connector does with one `open` call.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub accept: bool,
    pub delay: Duration,
}

impl Outcome {
    pub fn accept() -> Self {
        Self {
            accept: true,
            delay: Duration::ZERO,
        }
    }

    pub fn refuse() -> Self {
        Self {
            accept: false,
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
}

#[derive(Default)]
struct Script {
    plan: Mutex<VecDeque<Outcome>>,
    opens: Mutex<Vec<Instant>>,
    peers: Mutex<VecDeque<TransportPeer>>,
}

/// In-memory [`Connector`] that follows a plan of outcomes.
///
/// Once the plan runs out every open is accepted. Accepted transports park
/// their [`TransportPeer`] here until a test takes it, so an untaken
/// transport stays open.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Script>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(plan: impl IntoIterator<Item = Outcome>) -> Self {
        let connector = Self::default();
        connector.script.plan.lock().unwrap().extend(plan);
        connector
    }

    /// Instants at which `open` was called.
    pub fn opens(&self) -> Vec<Instant> {
        self.script.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.script.opens.lock().unwrap().len()
    }

    /// Oldest accepted transport not yet taken.
    pub fn take_peer(&self) -> TransportPeer {
        self.script
            .peers
            .lock()
            .unwrap()
            .pop_front()
            .expect("no accepted transport waiting")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, _url: &str) -> Result<TransportHandle, RealtimeError> {
        self.script.opens.lock().unwrap().push(Instant::now());
        let outcome = self
            .script
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Outcome::accept);

        if !outcome.delay.is_zero() {
            tokio::time::sleep(outcome.delay).await;
        }

        if !outcome.accept {
            return Err(RealtimeError::Connection("refused by script".into()));
        }

        let (handle, peer) = TransportHandle::pair();
        self.script.peers.lock().unwrap().push_back(peer);
        Ok(handle)
    }
}

/// Config with default backoff and a short close flush timeout.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("ws://test.invalid");
    config.client_id = "test-client".into();
    config.close_timeout = Duration::from_millis(100);
    config
}

pub fn scripted_client(connector: &ScriptedConnector) -> RealtimeClient {
    RealtimeClient::with_connector(test_config(), connector.clone())
}

/// Poll `condition` every 10ms (of runtime time) for up to two minutes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(120);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned tasks run for `duration` of runtime time.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Run `future`, failing the test if it does not finish within 10 seconds.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}
