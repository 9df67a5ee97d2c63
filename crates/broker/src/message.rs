use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::queue::Queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Ready,
    InFlight,
    Done,
    Dead,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub queue: String,
    pub payload: String,
    pub attempt: i64,
    #[allow(dead_code)]
    pub status: String,
    #[allow(dead_code)]
    pub available_at: DateTime<Utc>,
}

/// One delivery handed to a consumer. Carries enough to ack/nack without a
/// second round-trip to the store.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub queue: Queue,
    pub payload: serde_json::Value,
    pub attempt: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub task_source_id: Uuid,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMessage {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplMessage {
    pub task_id: Uuid,
}
