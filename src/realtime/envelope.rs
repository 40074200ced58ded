//! Wire envelope for realtime events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{Message, OwnerId};

/// Event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewEmail,
    EmailSummary,
    Connection,
}

/// `{type, data, time}` with `time` in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
    pub time: i64,
}

impl Envelope {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            time: Utc::now().timestamp(),
        }
    }

    pub fn new_email(message: &Message) -> serde_json::Result<Self> {
        Ok(Self::new(EventKind::NewEmail, serde_json::to_value(message)?))
    }

    pub fn email_summary(count: usize) -> Self {
        Self::new(
            EventKind::EmailSummary,
            json!({
                "count": count,
                "message": format!("{count} new emails received"),
            }),
        )
    }

    /// Acknowledgement sent to a sink as soon as it registers.
    pub fn connection(owner: &OwnerId) -> Self {
        Self::new(
            EventKind::Connection,
            json!({
                "message": "Connected to email updates",
                "userId": owner.as_str(),
            }),
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
