use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message carrying a transfer amount between queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Amount to transfer.
    pub payload: i64,
    /// Queue the message was last enqueued on. Empty until first enqueued.
    #[serde(default)]
    pub destination: String,
    /// Number of times a unit of work holding this message rolled back.
    #[serde(default)]
    pub redelivery_count: u32,
    /// Queue the message was taken from before it was dead-lettered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Message {
    pub fn new(payload: i64) -> Self {
        Self {
            id: MessageId::new(),
            payload,
            destination: String::new(),
            redelivery_count: 0,
            origin: None,
        }
    }

    /// Returns a copy addressed to `queue`, keeping the id.
    pub fn addressed_to(&self, queue: &str) -> Self {
        Self {
            destination: queue.to_string(),
            ..self.clone()
        }
    }
}
