use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::join_request::Decision;

/// Outcome message for a requester, stored at `users/{requester}/notifications/{trip}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub trip_id: String,
    pub decision: Decision,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn message_for(trip_id: &str, decision: Decision) -> String {
        format!("Your request to join trip {trip_id} was {decision}.")
    }
}

/// Fields written at resolution; `timestamp` is stamped by the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification<'a> {
    pub trip_id: &'a str,
    pub decision: Decision,
    pub message: String,
}
