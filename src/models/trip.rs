use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripOwner {
    pub id: String,
    pub name: String,
}

/// Appended to `Trip::accepted_requests` when a join request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedRiderEntry {
    pub trip_id: String,
    pub requester_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub user: TripOwner,
    pub source: String,
    pub destination: String,
    pub source_coords: Option<Coords>,
    pub destination_coords: Option<Coords>,
    pub date: NaiveDate,
    pub time: String,
    pub seats: u32,
    pub distance: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_requests: Vec<AcceptedRiderEntry>,
}

impl Trip {
    pub fn owner_id(&self) -> &str {
        &self.user.id
    }

    pub fn has_rider(&self, requester_id: &str) -> bool {
        self.accepted_requests
            .iter()
            .any(|entry| entry.requester_id == requester_id)
    }

    pub fn seats_left(&self) -> u32 {
        self.seats
            .saturating_sub(self.accepted_requests.len() as u32)
    }
}

/// Trip fields as written at creation; `createdAt` is added by the store.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrip<'a> {
    pub id: &'a str,
    pub user: &'a TripOwner,
    pub source: &'a str,
    pub destination: &'a str,
    pub source_coords: Option<Coords>,
    pub destination_coords: Option<Coords>,
    pub date: NaiveDate,
    pub time: &'a str,
    pub seats: u32,
    pub distance: Option<f64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_stored_trip_without_optional_fields() {
        let trip: Trip = serde_json::from_value(json!({
            "id": "t1",
            "user": {"id": "alice", "name": "Alice"},
            "source": "Oslo",
            "destination": "Bergen",
            "date": "2025-06-01",
            "time": "08:30",
            "seats": 3,
            "createdAt": "2025-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(trip.owner_id(), "alice");
        assert!(trip.accepted_requests.is_empty());
        assert_eq!(trip.seats_left(), 3);
        assert!(trip.source_coords.is_none());
    }
}
