use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::{errors::Result, record::RecordView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl Display for EventAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Created => write!(f, "created"),
            EventAction::Updated => write!(f, "updated"),
            EventAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// Mutation notification published after a successful record write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub action: EventAction,
    pub record: RecordView,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(action: EventAction, record: RecordView) -> Self {
        Event {
            action,
            record,
            timestamp: Utc::now(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Identifies one delivery of a message; used to acknowledge or abandon it.
pub type DeliveryTag = u64;

/// A received, locked message awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub event: Event,
    // 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
}
