use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job identifiers are opaque strings on the wire (UUIDs in practice).
pub type JobId = String;

/// Opaque identity token of one realtime client instance.
pub type ClientId = String;

/// Timestamp as carried by a wire message.
///
/// The server emits ISO-8601 strings for most lifecycle events, but some
/// progress and failure notifications carry a bare number instead. Both forms
/// are preserved as received so that re-serializing a message reproduces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Text(String),
    Number(f64),
}

impl WireTimestamp {
    /// Interpret the timestamp as a UTC instant.
    ///
    /// Accepts RFC 3339 strings and naive ISO-8601 strings (assumed UTC).
    /// Numeric timestamps are server-local clock readings with no fixed
    /// epoch, so they yield `None`.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                }),
            Self::Number(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for WireTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(value.to_rfc3339())
    }
}

/// Lifecycle status of a scraping job as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether no further lifecycle events are expected for the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
