//! Realtime job channel message types and parser.
//!
//! Frames are JSON objects discriminated by a `"type"` field, e.g.
//! `{"type": "job_completed", "job_id": "...", "data_count": 12}`. Inbound
//! frames deserialize into [`ServerMessage`]; outbound commands serialize
//! from [`ClientCommand`]. The string tag only exists at this boundary,
//! everything past the parser matches on [`MessageKind`] or the enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::job_events::*;
use crate::types::{JobId, JobStatus, WireTimestamp};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Discriminant of every inbound message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
    JobStatusUpdate,
    Subscribed,
    Unsubscribed,
    Error,
    Pong,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        Self::JobStarted,
        Self::JobProgress,
        Self::JobCompleted,
        Self::JobFailed,
        Self::JobCancelled,
        Self::JobStatusUpdate,
        Self::Subscribed,
        Self::Unsubscribed,
        Self::Error,
        Self::Pong,
    ];

    /// Wire value of the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobStarted => MSG_TYPE_JOB_STARTED,
            Self::JobProgress => MSG_TYPE_JOB_PROGRESS,
            Self::JobCompleted => MSG_TYPE_JOB_COMPLETED,
            Self::JobFailed => MSG_TYPE_JOB_FAILED,
            Self::JobCancelled => MSG_TYPE_JOB_CANCELLED,
            Self::JobStatusUpdate => MSG_TYPE_JOB_STATUS_UPDATE,
            Self::Subscribed => MSG_TYPE_SUBSCRIBED,
            Self::Unsubscribed => MSG_TYPE_UNSUBSCRIBED,
            Self::Error => MSG_TYPE_ERROR,
            Self::Pong => MSG_TYPE_PONG,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A `type` value outside the known inbound set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown message type `{0}`")]
pub struct UnknownKind(pub String);

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Every message the server may push to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    JobStarted(JobStartedData),
    JobProgress(JobProgressData),
    JobCompleted(JobCompletedData),
    JobFailed(JobFailedData),
    JobCancelled(JobCancelledData),
    /// Status change broadcast to all clients, subscribed or not.
    JobStatusUpdate(JobStatusUpdateData),
    Subscribed(SubscriptionAck),
    Unsubscribed(SubscriptionAck),
    Error(ErrorData),
    Pong(PongData),
}

/// Payload for `job_started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStartedData {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Target URL the job is scraping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `job_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgressData {
    pub job_id: JobId,
    /// Pipeline stage name, e.g. `"navigating"` or `"extracting"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Completion percentage (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `job_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletedData {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Number of extracted records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `job_failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailedData {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `job_cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCancelledData {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `job_status_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusUpdateData {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Payload for `subscribed` / `unsubscribed` acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload for `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload for `pong`. Echoes the timestamp of the originating ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::JobStarted(_) => MessageKind::JobStarted,
            Self::JobProgress(_) => MessageKind::JobProgress,
            Self::JobCompleted(_) => MessageKind::JobCompleted,
            Self::JobFailed(_) => MessageKind::JobFailed,
            Self::JobCancelled(_) => MessageKind::JobCancelled,
            Self::JobStatusUpdate(_) => MessageKind::JobStatusUpdate,
            Self::Subscribed(_) => MessageKind::Subscribed,
            Self::Unsubscribed(_) => MessageKind::Unsubscribed,
            Self::Error(_) => MessageKind::Error,
            Self::Pong(_) => MessageKind::Pong,
        }
    }

    /// The job this message correlates to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStarted(d) => Some(&d.job_id),
            Self::JobProgress(d) => Some(&d.job_id),
            Self::JobCompleted(d) => Some(&d.job_id),
            Self::JobFailed(d) => Some(&d.job_id),
            Self::JobCancelled(d) => Some(&d.job_id),
            Self::JobStatusUpdate(d) => Some(&d.job_id),
            Self::Subscribed(ack) | Self::Unsubscribed(ack) => ack.job_id.as_deref(),
            Self::Error(_) | Self::Pong(_) => None,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        match self {
            Self::JobStarted(d) => d.status,
            Self::JobCompleted(d) => d.status,
            Self::JobFailed(d) => d.status,
            Self::JobCancelled(d) => d.status,
            Self::JobStatusUpdate(d) => d.status,
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<&WireTimestamp> {
        match self {
            Self::JobStarted(d) => d.timestamp.as_ref(),
            Self::JobProgress(d) => d.timestamp.as_ref(),
            Self::JobCompleted(d) => d.timestamp.as_ref(),
            Self::JobFailed(d) => d.timestamp.as_ref(),
            Self::JobCancelled(d) => d.timestamp.as_ref(),
            Self::JobStatusUpdate(d) => d.timestamp.as_ref(),
            Self::Pong(d) => d.timestamp.as_ref(),
            Self::Subscribed(_) | Self::Unsubscribed(_) | Self::Error(_) => None,
        }
    }

    /// Whether this message ends the lifecycle of its job.
    ///
    /// Status updates count only when they carry a terminal status.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::JobCompleted(_) | Self::JobFailed(_) | Self::JobCancelled(_) => true,
            Self::JobStatusUpdate(d) => d.status.is_some_and(JobStatus::is_terminal),
            _ => false,
        }
    }

    /// Serialize back into a wire frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// ClientCommand
// ---------------------------------------------------------------------------

/// Commands a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SubscribeJob { job_id: JobId },
    UnsubscribeJob { job_id: JobId },
    /// Liveness probe; `timestamp` is milliseconds since the Unix epoch.
    Ping { timestamp: i64 },
}

impl ClientCommand {
    pub fn subscribe_job(job_id: impl Into<JobId>) -> Self {
        Self::SubscribeJob {
            job_id: job_id.into(),
        }
    }

    pub fn unsubscribe_job(job_id: impl Into<JobId>) -> Self {
        Self::UnsubscribeJob {
            job_id: job_id.into(),
        }
    }

    /// A ping stamped with the current wall-clock time.
    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Wire value of the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscribeJob { .. } => CMD_TYPE_SUBSCRIBE_JOB,
            Self::UnsubscribeJob { .. } => CMD_TYPE_UNSUBSCRIBE_JOB,
            Self::Ping { .. } => CMD_TYPE_PING,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Reasons an inbound frame could not be turned into a [`ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The frame is not valid JSON.
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is JSON but has no string `type` field.
    #[error("Frame has no `type` field")]
    MissingType,

    #[error(transparent)]
    UnknownType(#[from] UnknownKind),

    /// The `type` is known but the remaining fields do not match it.
    #[error("Invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a text frame into a typed message.
///
/// Callers should log the error and drop the frame; a bad frame never
/// affects the connection.
pub fn parse_message(text: &str) -> Result<ServerMessage, ParseError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(ParseError::Malformed)?;

    let kind: MessageKind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ParseError::MissingType)?
        .parse()?;

    serde_json::from_value(value).map_err(|source| ParseError::InvalidPayload { kind, source })
}
