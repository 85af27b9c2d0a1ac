//! Where each record lives in the document store.
//!
//! ```text
//! users/{uid}                                    profile
//! users/{owner}/requests/{trip}:{requester}      owner copy of a join request
//! users/{requester}/sentRequests/{trip}          requester copy
//! users/{requester}/notifications/{trip}         resolution notification
//! users/{owner}/trips/{trip}                     owner copy of a trip
//! trips/{trip}                                   global trip, holds acceptedRequests
//! ```

use crate::store::{CollectionPath, DocumentPath, StoreError};

const USERS: &str = "users";
const TRIPS: &str = "trips";
const REQUESTS: &str = "requests";
const SENT_REQUESTS: &str = "sentRequests";
const NOTIFICATIONS: &str = "notifications";

/// Separator of the owner-side request id; forbidden inside trip and user ids.
const KEY_SEPARATOR: char = ':';

pub fn user_doc(uid: &str) -> Result<DocumentPath, StoreError> {
    CollectionPath::root(USERS)?.doc(uid)
}

pub fn inbox(owner_id: &str) -> Result<CollectionPath, StoreError> {
    user_doc(owner_id)?.collection(REQUESTS)
}

/// One document per (owner, trip, requester): a repeated request replaces the
/// earlier one instead of adding a second.
pub fn inbox_doc(
    owner_id: &str,
    trip_id: &str,
    requester_id: &str,
) -> Result<DocumentPath, StoreError> {
    for part in [trip_id, requester_id] {
        if part.is_empty() || part.contains(KEY_SEPARATOR) {
            return Err(StoreError::InvalidPath(format!(
                "{part:?} is not a valid request key part"
            )));
        }
    }
    inbox(owner_id)?.doc(&format!("{trip_id}{KEY_SEPARATOR}{requester_id}"))
}

pub fn sent_requests(requester_id: &str) -> Result<CollectionPath, StoreError> {
    user_doc(requester_id)?.collection(SENT_REQUESTS)
}

pub fn sent_request_doc(requester_id: &str, trip_id: &str) -> Result<DocumentPath, StoreError> {
    sent_requests(requester_id)?.doc(trip_id)
}

pub fn notifications(uid: &str) -> Result<CollectionPath, StoreError> {
    user_doc(uid)?.collection(NOTIFICATIONS)
}

pub fn notification_doc(uid: &str, trip_id: &str) -> Result<DocumentPath, StoreError> {
    notifications(uid)?.doc(trip_id)
}

pub fn trips() -> Result<CollectionPath, StoreError> {
    CollectionPath::root(TRIPS)
}

pub fn trip_doc(trip_id: &str) -> Result<DocumentPath, StoreError> {
    trips()?.doc(trip_id)
}

pub fn user_trip_doc(owner_id: &str, trip_id: &str) -> Result<DocumentPath, StoreError> {
    user_doc(owner_id)?.collection(TRIPS)?.doc(trip_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_copies_live_under_each_user() {
        assert_eq!(
            inbox_doc("alice", "T1", "bob").unwrap().to_string(),
            "users/alice/requests/T1:bob"
        );
        assert_eq!(
            sent_request_doc("bob", "T1").unwrap().to_string(),
            "users/bob/sentRequests/T1"
        );
        assert_eq!(
            notification_doc("bob", "T1").unwrap().to_string(),
            "users/bob/notifications/T1"
        );
        assert_eq!(
            user_trip_doc("alice", "T1").unwrap().to_string(),
            "users/alice/trips/T1"
        );
    }

    #[test]
    fn ambiguous_request_keys_are_rejected() {
        assert!(inbox_doc("alice", "T1:x", "bob").is_err());
        assert!(inbox_doc("alice", "T1", "").is_err());
        assert!(sent_request_doc("bob", "a/b").is_err());
    }
}
