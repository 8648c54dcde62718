//! Wire contracts for the jobwire realtime job channel.
//!
//! Shared by the realtime client and anything that needs to produce or
//! inspect job lifecycle frames:
//!
//! - [`messages`]: typed inbound [`ServerMessage`]s, outbound
//!   [`ClientCommand`]s and the frame parser.
//! - [`topic`]: subscription keys, including the wildcard.
//! - [`job_events`]: the `type` tag constants.
//! - [`types`]: identifiers, job status and wire timestamps.

pub mod job_events;
pub mod messages;
pub mod topic;
pub mod types;

pub use messages::{parse_message, ClientCommand, MessageKind, ParseError, ServerMessage};
pub use topic::Topic;
pub use types::{ClientId, JobId, JobStatus, WireTimestamp};
