/// Errors surfaced to callers of the realtime client.
///
/// `Clone` so that one in-flight connection attempt can hand the same
/// outcome to every caller awaiting it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RealtimeError {
    /// Failed to establish the transport connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The attempt was superseded by `disconnect()` before it completed.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// The background task driving the attempt panicked or was aborted.
    #[error("Connection task failed: {0}")]
    TaskFailed(String),

    /// An environment variable held an unusable value.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidConfig { var: &'static str, value: String },
}
