use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel participant id for the scripted assistant
pub const BOT_ID: &str = "bot";

/// One chat line. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender_id: impl Into<String>, receiver_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn involves_bot(&self) -> bool {
        self.sender_id == BOT_ID || self.receiver_id == BOT_ID
    }

    /// True when the message was exchanged between `a` and `b`, either direction
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }

    /// The other side of the conversation from `user`'s point of view
    pub fn partner_of(&self, user: &str) -> Option<&str> {
        if self.sender_id == user {
            Some(&self.receiver_id)
        } else if self.receiver_id == user {
            Some(&self.sender_id)
        } else {
            None
        }
    }
}
