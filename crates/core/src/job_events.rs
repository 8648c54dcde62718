//! WebSocket message type constants for the realtime job channel.
//!
//! Server-to-client types describe job lifecycle events and protocol
//! acknowledgements; client-to-server types are the three commands a
//! client may issue.

/// A job has begun executing.
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// Progress update during job execution (stage + percentage).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled (by user or system).
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// Job status changed; broadcast to every connected client.
pub const MSG_TYPE_JOB_STATUS_UPDATE: &str = "job_status_update";

/// Acknowledgement of a `subscribe_job` command.
pub const MSG_TYPE_SUBSCRIBED: &str = "subscribed";

/// Acknowledgement of an `unsubscribe_job` command.
pub const MSG_TYPE_UNSUBSCRIBED: &str = "unsubscribed";

/// The server rejected a command (bad JSON, bad job id, unknown type).
pub const MSG_TYPE_ERROR: &str = "error";

/// Reply to a `ping` command.
pub const MSG_TYPE_PONG: &str = "pong";

/// Command: start forwarding events for one job to this client.
pub const CMD_TYPE_SUBSCRIBE_JOB: &str = "subscribe_job";

/// Command: stop forwarding events for one job to this client.
pub const CMD_TYPE_UNSUBSCRIBE_JOB: &str = "unsubscribe_job";

/// Command: liveness probe, answered with `pong`.
pub const CMD_TYPE_PING: &str = "ping";

/// Subscription key matching every inbound message type.
pub const WILDCARD_TOPIC: &str = "*";
