//! Subscription keys for inbound message dispatch.

use std::fmt;
use std::str::FromStr;

use crate::job_events::WILDCARD_TOPIC;
use crate::messages::{MessageKind, UnknownKind};

/// What a handler subscribes to: one message kind, or every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Kind(MessageKind),
    /// Wildcard (`"*"`); receives every inbound message in addition to
    /// any kind-specific handlers.
    Any,
}

impl Topic {
    pub fn matches(self, kind: MessageKind) -> bool {
        match self {
            Self::Kind(k) => k == kind,
            Self::Any => true,
        }
    }
}

impl From<MessageKind> for Topic {
    fn from(kind: MessageKind) -> Self {
        Self::Kind(kind)
    }
}

impl FromStr for Topic {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == WILDCARD_TOPIC {
            Ok(Self::Any)
        } else {
            s.parse().map(Self::Kind)
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(kind) => kind.fmt(f),
            Self::Any => f.write_str(WILDCARD_TOPIC),
        }
    }
}
