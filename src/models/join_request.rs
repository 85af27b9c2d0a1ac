use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [Self::Pending, Self::Accepted, Self::Declined];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(AppError::BadRequest(format!("unknown status {other:?}"))),
        }
    }
}

/// The owner's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Declined,
}

impl Decision {
    pub fn status(&self) -> RequestStatus {
        match self {
            Decision::Accepted => RequestStatus::Accepted,
            Decision::Declined => RequestStatus::Declined,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.status().fmt(f)
    }
}

impl FromStr for Decision {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "accepted" | "accept" => Ok(Self::Accepted),
            "declined" | "decline" => Ok(Self::Declined),
            other => Err(AppError::BadRequest(format!("unknown decision {other:?}"))),
        }
    }
}

/// Owner-side copy, stored at `users/{owner}/requests/{trip}:{requester}`.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub trip_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub source: String,
    pub destination: String,
    pub status: RequestStatus,
    pub timestamp: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Requester-side copy, stored at `users/{requester}/sentRequests/{trip}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentRequest {
    #[serde(flatten)]
    pub request: JoinRequest,
    pub trip_owner_id: String,
}

/// Fields written at issuance. `timestamp` is stamped by the store.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJoinRequest<'a> {
    pub trip_id: &'a str,
    pub requester_id: &'a str,
    pub requester_name: &'a str,
    pub source: &'a str,
    pub destination: &'a str,
    pub status: RequestStatus,
    pub trip_owner_id: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sent_request_carries_owner_next_to_request_fields() {
        let sent: SentRequest = serde_json::from_value(json!({
            "tripId": "T1",
            "requesterId": "bob",
            "requesterName": "Bob",
            "source": "Oslo",
            "destination": "Bergen",
            "status": "pending",
            "timestamp": "2025-05-01T10:00:00Z",
            "tripOwnerId": "alice"
        }))
        .unwrap();
        assert_eq!(sent.trip_owner_id, "alice");
        assert_eq!(sent.request.status, RequestStatus::Pending);
        assert!(sent.request.resolved_at.is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = serde_json::from_value::<JoinRequest>(json!({
            "tripId": "T1",
            "requesterId": "bob",
            "requesterName": "Bob",
            "source": "Oslo",
            "destination": "Bergen",
            "status": "maybe",
            "timestamp": "2025-05-01T10:00:00Z"
        }));
        assert!(err.is_err());
        assert!("maybe".parse::<RequestStatus>().is_err());
        assert_eq!("decline".parse::<Decision>().unwrap(), Decision::Declined);
    }
}
