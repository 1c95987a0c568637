//! Typed records stored in the tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Discovery-listing entry under `available/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl RoomListing {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// Default entry written by the self-heal pass when a listing has
    /// gone missing.
    pub fn placeholder() -> Self {
        Self::new("Room Name")
    }

    pub fn into_value(self) -> Value {
        json!({
            "name": self.name,
            "createdAt": self.created_at.to_rfc3339(),
        })
    }
}

/// Append-only log entry on the room document, consumed by playback sync
/// to replay state for newcomers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Epoch milliseconds.
    pub created_at: i64,
    pub sender_id: String,
    pub time: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl JoinRequest {
    pub fn join(sender_id: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now().timestamp_millis(),
            sender_id: sender_id.into(),
            time: 0,
            kind: "join".to_owned(),
        }
    }

    pub fn into_value(self) -> Value {
        json!({
            "createdAt": self.created_at,
            "senderId": self.sender_id,
            "time": self.time,
            "type": self.kind,
        })
    }
}

/// Durable room document under `meta/rooms/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDoc {
    pub owner_id: String,
}

/// Profile under `users/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}
