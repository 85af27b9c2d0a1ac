//! Join-request lifecycle: issuance, resolution and the two read-side views.
//!
//! A request exists twice, once in the trip owner's inbox and once in the
//! requester's sent list. Both copies, the notification and the trip's
//! accepted-rider entry are always written in a single batch, so readers never
//! see the copies disagree.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    layout,
    models::{
        join_request::{Decision, JoinRequest, NewJoinRequest, RequestStatus, SentRequest},
        notification::{NewNotification, Notification},
        trip::Trip,
    },
    store::{
        decode_all, encode, subscribe, CollectionPath, Direction, FieldChange, Query,
        SharedStore, StoreError, TypedSubscription, WriteBatch,
    },
};

const ACCEPTED_RIDERS_FIELD: &str = "acceptedRequests";

/// Resolution attempts before a keeps-changing request is reported as a conflict.
const RESOLVE_ATTEMPTS: usize = 3;

enum Resolution {
    Committed,
    AlreadyApplied,
    /// The owner copy or trip changed between read and commit.
    Raced,
}

/// Everything the requester supplies when asking to join a trip.
#[derive(Debug, Clone)]
pub struct IssueJoinRequest {
    pub trip_id: String,
    pub trip_owner_id: String,
    pub requester_name: String,
    pub source: String,
    pub destination: String,
}

/// A view split by status. In a settled state a trip appears in exactly one list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPartitions<T> {
    pub pending: Vec<T>,
    pub accepted: Vec<T>,
    pub declined: Vec<T>,
}

impl<T> Default for RequestPartitions<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            accepted: Vec::new(),
            declined: Vec::new(),
        }
    }
}

impl<T> RequestPartitions<T> {
    pub fn get(&self, status: RequestStatus) -> &[T] {
        match status {
            RequestStatus::Pending => &self.pending,
            RequestStatus::Accepted => &self.accepted,
            RequestStatus::Declined => &self.declined,
        }
    }

    pub fn into_status(self, status: RequestStatus) -> Vec<T> {
        match status {
            RequestStatus::Pending => self.pending,
            RequestStatus::Accepted => self.accepted,
            RequestStatus::Declined => self.declined,
        }
    }

    fn slot(&mut self, status: RequestStatus) -> &mut Vec<T> {
        match status {
            RequestStatus::Pending => &mut self.pending,
            RequestStatus::Accepted => &mut self.accepted,
            RequestStatus::Declined => &mut self.declined,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.accepted.len() + self.declined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct RequestService {
    store: SharedStore,
}

fn status_query(collection: CollectionPath, status: RequestStatus) -> Query {
    Query::new(collection)
        .where_eq("status", status.as_str())
        .order_by("timestamp", Direction::Descending)
}

fn log_failure(operation: &str, err: &AppError) {
    match err {
        AppError::Store(_) | AppError::Database(_) | AppError::Other(_) => {
            error!("{operation} failed: {err:?}")
        }
        _ => error!("{operation} rejected: {err}"),
    }
}

impl RequestService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Writes a pending request into the owner's inbox and the requester's sent
    /// list. Re-issuing for the same trip replaces an earlier pending or declined
    /// request; once accepted the requester is a rider and re-issuing is a conflict.
    pub async fn issue_join_request(
        &self,
        requester: &AuthenticatedUser,
        request: IssueJoinRequest,
    ) -> Result<(), AppError> {
        let result = self.try_issue(requester, &request).await;
        match &result {
            Ok(()) => info!(
                trip = %request.trip_id,
                owner = %request.trip_owner_id,
                requester = %requester.uuid,
                "join request issued"
            ),
            Err(err) => log_failure("issue join request", err),
        }
        result
    }

    async fn try_issue(
        &self,
        requester: &AuthenticatedUser,
        request: &IssueJoinRequest,
    ) -> Result<(), AppError> {
        if requester.uuid.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        if request.trip_owner_id == requester.uuid {
            return Err(AppError::BadRequest(
                "You cannot request to join your own trip.".into(),
            ));
        }

        let trip_path = layout::trip_doc(&request.trip_id)?;
        let trip: Trip = self
            .store
            .get(&trip_path)
            .await?
            .ok_or(AppError::NotFound)?
            .decode()?;
        if trip.owner_id() != request.trip_owner_id {
            return Err(AppError::BadRequest(format!(
                "Trip {} is not offered by {}.",
                request.trip_id, request.trip_owner_id
            )));
        }

        let owner_copy_path =
            layout::inbox_doc(&request.trip_owner_id, &request.trip_id, &requester.uuid)?;
        let existing = self.store.get(&owner_copy_path).await?;
        let already_accepted = match &existing {
            Some(doc) => doc.decode::<JoinRequest>()?.status == RequestStatus::Accepted,
            None => false,
        };
        if already_accepted || trip.has_rider(&requester.uuid) {
            return Err(AppError::Conflict(format!(
                "You are already a rider on trip {}.",
                request.trip_id
            )));
        }

        let owner_copy = NewJoinRequest {
            trip_id: &request.trip_id,
            requester_id: &requester.uuid,
            requester_name: &request.requester_name,
            source: &request.source,
            destination: &request.destination,
            status: RequestStatus::Pending,
            trip_owner_id: None,
        };
        let requester_copy = NewJoinRequest {
            trip_owner_id: Some(&request.trip_owner_id),
            ..owner_copy.clone()
        };

        let mut batch = WriteBatch::new();
        batch.require_exists(trip_path);
        if let Some(doc) = &existing {
            // An acceptance landing in between must not be overwritten with pending.
            batch.require_unchanged(owner_copy_path.clone(), doc.update_time);
        }
        batch
            .set_with(
                owner_copy_path,
                encode(&owner_copy)?,
                vec![FieldChange::server_timestamp("timestamp")],
            )
            .set_with(
                layout::sent_request_doc(&requester.uuid, &request.trip_id)?,
                encode(&requester_copy)?,
                vec![FieldChange::server_timestamp("timestamp")],
            );
        self.store.commit(batch).await?;
        Ok(())
    }

    /// The trip owner accepts or declines a request. Both copies, the
    /// requester's notification and (on acceptance) the trip's rider list are
    /// updated together or not at all.
    pub async fn resolve_join_request(
        &self,
        owner: &AuthenticatedUser,
        trip_owner_id: &str,
        trip_id: &str,
        requester_id: &str,
        decision: Decision,
    ) -> Result<(), AppError> {
        let result = self
            .try_resolve(owner, trip_owner_id, trip_id, requester_id, decision)
            .await;
        match &result {
            Ok(()) => info!(
                trip = %trip_id,
                requester = %requester_id,
                %decision,
                "join request resolved"
            ),
            Err(err) => log_failure("resolve join request", err),
        }
        result
    }

    async fn try_resolve(
        &self,
        owner: &AuthenticatedUser,
        trip_owner_id: &str,
        trip_id: &str,
        requester_id: &str,
        decision: Decision,
    ) -> Result<(), AppError> {
        if owner.uuid.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        if owner.uuid != trip_owner_id {
            return Err(AppError::Forbidden);
        }

        for attempt in 0..RESOLVE_ATTEMPTS {
            let retrying = attempt > 0;
            match self
                .resolve_once(owner, trip_owner_id, trip_id, requester_id, decision, retrying)
                .await?
            {
                Resolution::Committed | Resolution::AlreadyApplied => return Ok(()),
                Resolution::Raced => {
                    debug!(
                        trip = %trip_id,
                        requester = %requester_id,
                        attempt,
                        "resolution raced, re-reading"
                    );
                }
            }
        }
        Err(AppError::Conflict(format!(
            "The request for trip {trip_id} kept changing, please retry."
        )))
    }

    async fn resolve_once(
        &self,
        owner: &AuthenticatedUser,
        trip_owner_id: &str,
        trip_id: &str,
        requester_id: &str,
        decision: Decision,
        retrying: bool,
    ) -> Result<Resolution, AppError> {
        let owner_copy_path = layout::inbox_doc(trip_owner_id, trip_id, requester_id)?;
        let owner_copy = self
            .store
            .get(&owner_copy_path)
            .await?
            .ok_or(AppError::NotFound)?;
        let current: JoinRequest = owner_copy.decode()?;
        if current.status.is_resolved() && current.status != decision.status() {
            return Err(AppError::Conflict(format!(
                "This request was already {}.",
                current.status
            )));
        }
        // A concurrent call with the same decision won the race; its batch wrote everything.
        if retrying && current.status == decision.status() {
            return Ok(Resolution::AlreadyApplied);
        }

        let status_changes = vec![
            FieldChange::set("status", decision.status().as_str()),
            FieldChange::server_timestamp("resolvedAt"),
        ];
        let notification = NewNotification {
            trip_id,
            decision,
            message: Notification::message_for(trip_id, decision),
        };

        let mut batch = WriteBatch::new();
        batch
            .require_unchanged(owner_copy_path.clone(), owner_copy.update_time)
            .update(owner_copy_path, status_changes.clone())
            .update(
                layout::sent_request_doc(requester_id, trip_id)?,
                status_changes,
            )
            .set_with(
                layout::notification_doc(requester_id, trip_id)?,
                encode(&notification)?,
                vec![FieldChange::server_timestamp("timestamp")],
            );

        if decision == Decision::Accepted {
            let trip_path = layout::trip_doc(trip_id)?;
            let trip_doc = self
                .store
                .get(&trip_path)
                .await?
                .ok_or(AppError::NotFound)?;
            let trip: Trip = trip_doc.decode()?;
            if trip.owner_id() != owner.uuid {
                return Err(AppError::Forbidden);
            }
            if !trip.has_rider(requester_id) && trip.seats_left() == 0 {
                return Err(AppError::Conflict(format!(
                    "Trip {trip_id} has no seats left."
                )));
            }
            let entry = encode(&json!({
                "tripId": trip_id,
                "requesterId": requester_id,
                "status": RequestStatus::Accepted.as_str(),
            }))?;
            batch
                .require_unchanged(trip_path.clone(), trip_doc.update_time)
                .update(
                    trip_path,
                    vec![FieldChange::array_union_by(
                        ACCEPTED_RIDERS_FIELD,
                        &["tripId", "requesterId"],
                        entry,
                        Some("timestamp"),
                    )],
                );
        }

        match self.store.commit(batch).await {
            Ok(_) => Ok(Resolution::Committed),
            Err(StoreError::Conflict(_)) => Ok(Resolution::Raced),
            Err(err) => Err(err.into()),
        }
    }

    /// Requests received by `owner`, split by status.
    pub async fn owner_view(
        &self,
        owner: &AuthenticatedUser,
    ) -> Result<RequestPartitions<JoinRequest>, AppError> {
        self.partitions(layout::inbox(&owner.uuid)?).await
    }

    /// Requests sent by `requester`, split by status.
    pub async fn requester_view(
        &self,
        requester: &AuthenticatedUser,
    ) -> Result<RequestPartitions<SentRequest>, AppError> {
        self.partitions(layout::sent_requests(&requester.uuid)?)
            .await
    }

    async fn partitions<T: DeserializeOwned>(
        &self,
        collection: CollectionPath,
    ) -> Result<RequestPartitions<T>, AppError> {
        let mut partitions = RequestPartitions::default();
        for status in RequestStatus::ALL {
            let documents = self
                .store
                .query(&status_query(collection.clone(), status))
                .await?;
            *partitions.slot(status) = decode_all(&documents)?;
        }
        Ok(partitions)
    }

    /// Live owner-side partition for one status.
    pub fn watch_owner_view(
        &self,
        owner: &AuthenticatedUser,
        status: RequestStatus,
    ) -> Result<TypedSubscription<JoinRequest>, AppError> {
        let query = status_query(layout::inbox(&owner.uuid)?, status);
        Ok(subscribe(self.store.clone(), query).typed())
    }

    /// Live requester-side partition for one status.
    pub fn watch_requester_view(
        &self,
        requester: &AuthenticatedUser,
        status: RequestStatus,
    ) -> Result<TypedSubscription<SentRequest>, AppError> {
        let query = status_query(layout::sent_requests(&requester.uuid)?, status);
        Ok(subscribe(self.store.clone(), query).typed())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::{
        models::trip::AcceptedRiderEntry,
        services::trips::{TripInput, TripService},
        store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore},
    };

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        requests: RequestService,
        alice: AuthenticatedUser,
        bob: AuthenticatedUser,
        trip_id: String,
    }

    fn user(id: i64, uuid: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id,
            uuid: uuid.into(),
            username: uuid.to_lowercase(),
            email: format!("{}@example.com", uuid.to_lowercase()),
        }
    }

    async fn fixture(seats: u32) -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        let shared: SharedStore = store.clone();
        let alice = user(1, "Alice");
        let bob = user(2, "Bob");
        let trip = TripService::new(shared.clone())
            .create_trip(
                &alice,
                "Alice",
                TripInput {
                    source: "Oslo".into(),
                    destination: "Bergen".into(),
                    source_coords: None,
                    destination_coords: None,
                    date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                    time: "08:30".into(),
                    seats,
                    distance: Some(463.0),
                },
            )
            .await
            .unwrap();
        Fixture {
            requests: RequestService::new(shared),
            store,
            alice,
            bob,
            trip_id: trip.id,
        }
    }

    impl Fixture {
        fn issue(&self, requester: &AuthenticatedUser) -> IssueJoinRequest {
            IssueJoinRequest {
                trip_id: self.trip_id.clone(),
                trip_owner_id: self.alice.uuid.clone(),
                requester_name: requester.username.clone(),
                source: "Oslo".into(),
                destination: "Bergen".into(),
            }
        }

        async fn owner_copy(&self, requester: &str) -> Option<JoinRequest> {
            let path = layout::inbox_doc(&self.alice.uuid, &self.trip_id, requester).unwrap();
            self.store
                .get(&path)
                .await
                .unwrap()
                .map(|doc| doc.decode().unwrap())
        }

        async fn sent_copy(&self, requester: &str) -> Option<SentRequest> {
            let path = layout::sent_request_doc(requester, &self.trip_id).unwrap();
            self.store
                .get(&path)
                .await
                .unwrap()
                .map(|doc| doc.decode().unwrap())
        }

        async fn riders(&self) -> Vec<AcceptedRiderEntry> {
            let trip: Trip = self
                .store
                .get(&layout::trip_doc(&self.trip_id).unwrap())
                .await
                .unwrap()
                .unwrap()
                .decode()
                .unwrap();
            trip.accepted_requests
        }
    }

    #[tokio::test]
    async fn issuance_fans_out_pending_copies() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();

        let owner = fx.owner_copy("Bob").await.unwrap();
        let sent = fx.sent_copy("Bob").await.unwrap();
        assert_eq!(owner.status, RequestStatus::Pending);
        assert_eq!(sent.request.status, RequestStatus::Pending);
        assert_eq!(owner.trip_id, sent.request.trip_id);
        assert_eq!(owner.requester_id, "Bob");
        assert_eq!(owner.source, sent.request.source);
        assert_eq!(owner.destination, sent.request.destination);
        assert_eq!(owner.timestamp, sent.request.timestamp);
        assert_eq!(sent.trip_owner_id, "Alice");
    }

    #[tokio::test]
    async fn reissuing_overwrites_instead_of_duplicating() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        let mut again = fx.issue(&fx.bob);
        again.source = "Drammen".into();
        fx.requests
            .issue_join_request(&fx.bob, again)
            .await
            .unwrap();

        let view = fx.requests.owner_view(&fx.alice).await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.pending[0].source, "Drammen");
        assert_eq!(fx.requests.requester_view(&fx.bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reissuing_after_acceptance_keeps_the_rider_accepted() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();

        let err = fx
            .requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            fx.owner_copy("Bob").await.unwrap().status,
            RequestStatus::Accepted
        );
        assert_eq!(
            fx.sent_copy("Bob").await.unwrap().request.status,
            RequestStatus::Accepted
        );

        // Declining an accepted rider stays an invalid transition.
        let err = fx
            .requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Declined)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(fx.riders().await.len(), 1);
    }

    #[tokio::test]
    async fn reissuing_after_decline_starts_over() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Declined)
            .await
            .unwrap();
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();

        let view = fx.requests.owner_view(&fx.alice).await.unwrap();
        assert_eq!(view.pending.len(), 1);
        assert!(view.declined.is_empty());
        assert!(view.pending[0].resolved_at.is_none());
        assert!(fx.riders().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_identical_acceptances_both_succeed() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("requests.sqlite").display());
        let pool = crate::db::init_pool(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let store: SharedStore = Arc::new(SqliteDocumentStore::new(pool));
        let trips = TripService::new(store.clone());
        let requests = RequestService::new(store.clone());
        let alice = user(1, "Alice");

        for round in 0..10 {
            let rider = user(100 + round, &format!("Rider{round}"));
            let trip = trips
                .create_trip(
                    &alice,
                    "Alice",
                    TripInput {
                        source: "Oslo".into(),
                        destination: "Bergen".into(),
                        source_coords: None,
                        destination_coords: None,
                        date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                        time: "08:30".into(),
                        seats: 1,
                        distance: None,
                    },
                )
                .await
                .unwrap();
            requests
                .issue_join_request(
                    &rider,
                    IssueJoinRequest {
                        trip_id: trip.id.clone(),
                        trip_owner_id: alice.uuid.clone(),
                        requester_name: rider.username.clone(),
                        source: "Oslo".into(),
                        destination: "Bergen".into(),
                    },
                )
                .await
                .unwrap();

            let clicks: Vec<_> = (0..2)
                .map(|_| {
                    let requests = requests.clone();
                    let alice = alice.clone();
                    let trip_id = trip.id.clone();
                    let rider_id = rider.uuid.clone();
                    tokio::spawn(async move {
                        requests
                            .resolve_join_request(
                                &alice,
                                "Alice",
                                &trip_id,
                                &rider_id,
                                Decision::Accepted,
                            )
                            .await
                    })
                })
                .collect();
            for click in clicks {
                click.await.unwrap().unwrap();
            }

            let stored = trips.get(&trip.id).await.unwrap().unwrap();
            assert_eq!(stored.accepted_requests.len(), 1, "round {round}");
        }
    }

    #[tokio::test]
    async fn different_requesters_do_not_collide() {
        let fx = fixture(3).await;
        let carol = user(3, "Carol");
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        fx.requests
            .issue_join_request(&carol, fx.issue(&carol))
            .await
            .unwrap();
        assert_eq!(fx.requests.owner_view(&fx.alice).await.unwrap().pending.len(), 2);
    }

    #[tokio::test]
    async fn unauthenticated_issuance_writes_nothing() {
        let fx = fixture(3).await;
        let before = fx.store.len().await;
        let anonymous = user(0, "");
        let err = fx
            .requests
            .issue_join_request(&anonymous, fx.issue(&anonymous))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
        assert_eq!(fx.store.len().await, before);
    }

    #[tokio::test]
    async fn issuance_for_unknown_trip_or_own_trip_is_rejected() {
        let fx = fixture(3).await;
        let mut unknown = fx.issue(&fx.bob);
        unknown.trip_id = "nope".into();
        assert!(matches!(
            fx.requests.issue_join_request(&fx.bob, unknown).await,
            Err(AppError::NotFound)
        ));
        let own = fx.issue(&fx.alice);
        assert!(matches!(
            fx.requests.issue_join_request(&fx.alice, own).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn acceptance_updates_every_copy() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();

        let owner = fx.owner_copy("Bob").await.unwrap();
        let sent = fx.sent_copy("Bob").await.unwrap();
        assert_eq!(owner.status, RequestStatus::Accepted);
        assert_eq!(sent.request.status, RequestStatus::Accepted);
        assert!(owner.resolved_at.is_some());

        let notification: Notification = fx
            .store
            .get(&layout::notification_doc("Bob", &fx.trip_id).unwrap())
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(
            notification.message,
            format!("Your request to join trip {} was accepted.", fx.trip_id)
        );

        let riders = fx.riders().await;
        assert_eq!(riders.len(), 1);
        assert_eq!(riders[0].trip_id, fx.trip_id);
        assert_eq!(riders[0].requester_id, "Bob");
        assert_eq!(riders[0].status, "accepted");
        assert_eq!(riders[0].timestamp, notification.timestamp);
    }

    #[tokio::test]
    async fn repeated_acceptance_keeps_one_rider_entry() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        for _ in 0..2 {
            fx.requests
                .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
                .await
                .unwrap();
        }
        assert_eq!(fx.riders().await.len(), 1);
    }

    #[tokio::test]
    async fn decline_leaves_rider_list_alone_and_is_terminal() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Declined)
            .await
            .unwrap();
        assert!(fx.riders().await.is_empty());
        assert_eq!(
            fx.sent_copy("Bob").await.unwrap().request.status,
            RequestStatus::Declined
        );

        let err = fx
            .requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(fx.riders().await.is_empty());
    }

    #[tokio::test]
    async fn only_the_owner_may_resolve() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        let err = fx
            .requests
            .resolve_join_request(&fx.bob, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert_eq!(
            fx.owner_copy("Bob").await.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn missing_requester_copy_aborts_without_partial_writes() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        let mut batch = WriteBatch::new();
        batch.delete(layout::sent_request_doc("Bob", &fx.trip_id).unwrap());
        fx.store.commit(batch).await.unwrap();

        let err = fx
            .requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(
            fx.owner_copy("Bob").await.unwrap().status,
            RequestStatus::Pending
        );
        assert!(fx.riders().await.is_empty());
        assert!(fx
            .store
            .get(&layout::notification_doc("Bob", &fx.trip_id).unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn full_trip_rejects_further_riders() {
        let fx = fixture(1).await;
        let carol = user(3, "Carol");
        for rider in [&fx.bob, &carol] {
            fx.requests
                .issue_join_request(rider, fx.issue(rider))
                .await
                .unwrap();
        }
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();
        let err = fx
            .requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Carol", Decision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // Bob is already on board, so accepting him again still succeeds.
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn every_request_sits_in_exactly_one_partition() {
        let fx = fixture(3).await;
        let carol = user(3, "Carol");
        let dave = user(4, "Dave");
        for rider in [&fx.bob, &carol, &dave] {
            fx.requests
                .issue_join_request(rider, fx.issue(rider))
                .await
                .unwrap();
        }
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();
        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Carol", Decision::Declined)
            .await
            .unwrap();

        let view = fx.requests.owner_view(&fx.alice).await.unwrap();
        for requester in ["Bob", "Carol", "Dave"] {
            let hits = RequestStatus::ALL
                .iter()
                .filter(|status| {
                    view.get(**status)
                        .iter()
                        .any(|r| r.requester_id == requester)
                })
                .count();
            assert_eq!(hits, 1, "{requester} should be in exactly one partition");
        }
        assert_eq!(view.accepted[0].requester_id, "Bob");
        assert_eq!(view.declined[0].requester_id, "Carol");
        assert_eq!(view.pending[0].requester_id, "Dave");

        let carol_view = fx.requests.requester_view(&carol).await.unwrap();
        assert_eq!(carol_view.declined.len(), 1);
        assert!(carol_view.pending.is_empty() && carol_view.accepted.is_empty());
    }

    #[tokio::test]
    async fn live_view_follows_resolution() {
        let fx = fixture(3).await;
        fx.requests
            .issue_join_request(&fx.bob, fx.issue(&fx.bob))
            .await
            .unwrap();
        let mut pending = fx
            .requests
            .watch_requester_view(&fx.bob, RequestStatus::Pending)
            .unwrap();
        assert_eq!(pending.next().await.unwrap().unwrap().len(), 1);

        fx.requests
            .resolve_join_request(&fx.alice, "Alice", &fx.trip_id, "Bob", Decision::Accepted)
            .await
            .unwrap();
        assert!(pending.next().await.unwrap().unwrap().is_empty());
    }
}
