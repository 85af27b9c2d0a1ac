use chrono::{NaiveDate, NaiveTime};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    layout,
    models::trip::{Coords, NewTrip, Trip, TripOwner},
    store::{decode_all, encode, Direction, FieldChange, Query, SharedStore, WriteBatch},
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Trip as submitted by its owner.
#[derive(Debug, Clone)]
pub struct TripInput {
    pub source: String,
    pub destination: String,
    pub source_coords: Option<Coords>,
    pub destination_coords: Option<Coords>,
    pub date: NaiveDate,
    pub time: String,
    pub seats: u32,
    pub distance: Option<f64>,
}

/// Equality search; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TripSearch {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
}

impl TripSearch {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.destination.is_none() && self.date.is_none()
    }
}

/// Great-circle distance in km, rounded to two decimals.
pub fn haversine_km(from: Coords, to: Coords) -> f64 {
    let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let km = 2.0 * EARTH_RADIUS_KM * a.sqrt().asin();
    (km * 100.0).round() / 100.0
}

fn validate(input: &TripInput) -> Result<(), AppError> {
    if input.source.trim().is_empty() || input.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Please enter both a source and a destination.".into(),
        ));
    }
    if NaiveTime::parse_from_str(input.time.trim(), "%H:%M").is_err() {
        return Err(AppError::BadRequest("Time must look like HH:MM.".into()));
    }
    if input.seats == 0 {
        return Err(AppError::BadRequest("A trip needs at least one seat.".into()));
    }
    if let Some(distance) = input.distance {
        if !distance.is_finite() || distance < 0.0 {
            return Err(AppError::BadRequest("Distance cannot be negative.".into()));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct TripService {
    store: SharedStore,
}

impl TripService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Writes the trip under its owner and into the global trip list in one batch.
    pub async fn create_trip(
        &self,
        owner: &AuthenticatedUser,
        owner_name: &str,
        input: TripInput,
    ) -> Result<Trip, AppError> {
        if owner.uuid.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        validate(&input)?;

        let id = Uuid::new_v4().to_string();
        let user = TripOwner {
            id: owner.uuid.clone(),
            name: owner_name.to_string(),
        };
        let distance = input.distance.or_else(|| {
            input
                .source_coords
                .zip(input.destination_coords)
                .map(|(from, to)| haversine_km(from, to))
        });
        let fields = encode(&NewTrip {
            id: &id,
            user: &user,
            source: input.source.trim(),
            destination: input.destination.trim(),
            source_coords: input.source_coords,
            destination_coords: input.destination_coords,
            date: input.date,
            time: input.time.trim(),
            seats: input.seats,
            distance,
        })?;
        let created_at = vec![FieldChange::server_timestamp("createdAt")];

        let global = layout::trip_doc(&id)?;
        let mut batch = WriteBatch::new();
        batch
            .set_with(global.clone(), fields.clone(), created_at.clone())
            .set_with(layout::user_trip_doc(&owner.uuid, &id)?, fields, created_at);
        if let Err(err) = self.store.commit(batch).await {
            error!(owner = %owner.uuid, "failed to create trip: {err}");
            return Err(err.into());
        }
        info!(trip = %id, owner = %owner.uuid, "trip created");

        self.store
            .get(&global)
            .await?
            .ok_or(AppError::NotFound)?
            .decode()
            .map_err(AppError::from)
    }

    pub async fn get(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        match self.store.get(&layout::trip_doc(trip_id)?).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Every trip, newest first.
    pub async fn list(&self) -> Result<Vec<Trip>, AppError> {
        self.search(&TripSearch::default()).await
    }

    pub async fn search(&self, search: &TripSearch) -> Result<Vec<Trip>, AppError> {
        let mut query =
            Query::new(layout::trips()?).order_by("createdAt", Direction::Descending);
        if let Some(source) = &search.source {
            query = query.where_eq("source", source.trim());
        }
        if let Some(destination) = &search.destination {
            query = query.where_eq("destination", destination.trim());
        }
        if let Some(date) = search.date {
            query = query.where_eq("date", date.to_string());
        }
        let documents = self.store.query(&query).await?;
        Ok(decode_all(&documents)?)
    }

    /// Trips offered by `owner`, read from the owner's own copies.
    pub async fn offered_by(&self, owner: &AuthenticatedUser) -> Result<Vec<Trip>, AppError> {
        let query = Query::new(layout::user_doc(&owner.uuid)?.collection("trips")?)
            .order_by("createdAt", Direction::Descending);
        let documents = self.store.query(&query).await?;
        Ok(decode_all(&documents)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryDocumentStore;

    fn alice() -> AuthenticatedUser {
        AuthenticatedUser {
            id: 1,
            uuid: "alice-uuid".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
        }
    }

    fn input(source: &str, destination: &str, day: u32) -> TripInput {
        TripInput {
            source: source.into(),
            destination: destination.into(),
            source_coords: None,
            destination_coords: None,
            date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            time: "07:45".into(),
            seats: 2,
            distance: None,
        }
    }

    #[tokio::test]
    async fn creation_writes_both_copies() {
        let store = Arc::new(MemoryDocumentStore::new());
        let trips = TripService::new(store.clone());
        let trip = trips.create_trip(&alice(), "Alice", input("Oslo", "Bergen", 1)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(trip.user.name, "Alice");
        assert!(trip.accepted_requests.is_empty());
        assert_eq!(trips.offered_by(&alice()).await.unwrap(), vec![trip.clone()]);
        assert_eq!(trips.get(&trip.id).await.unwrap(), Some(trip));
    }

    #[tokio::test]
    async fn search_matches_on_equality_newest_first() {
        let trips = TripService::new(Arc::new(MemoryDocumentStore::new()));
        let first = trips.create_trip(&alice(), "Alice", input("Oslo", "Bergen", 1)).await.unwrap();
        trips.create_trip(&alice(), "Alice", input("Oslo", "Trondheim", 1)).await.unwrap();
        let third = trips.create_trip(&alice(), "Alice", input("Oslo", "Bergen", 1)).await.unwrap();
        trips.create_trip(&alice(), "Alice", input("Oslo", "Bergen", 2)).await.unwrap();

        let found = trips
            .search(&TripSearch {
                source: Some("Oslo".into()),
                destination: Some("Bergen".into()),
                date: NaiveDate::from_ymd_opt(2025, 6, 1),
            })
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, [third.id.as_str(), first.id.as_str()]);
        assert_eq!(trips.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn distance_falls_back_to_coordinates() {
        let trips = TripService::new(Arc::new(MemoryDocumentStore::new()));
        let mut with_coords = input("Oslo", "Bergen", 1);
        with_coords.source_coords = Some(Coords { lat: 59.9139, lng: 10.7522 });
        with_coords.destination_coords = Some(Coords { lat: 60.3913, lng: 5.3221 });
        let trip = trips.create_trip(&alice(), "Alice", with_coords).await.unwrap();
        let distance = trip.distance.unwrap();
        assert!((300.0..310.0).contains(&distance), "got {distance}");
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let trips = TripService::new(Arc::new(MemoryDocumentStore::new()));
        let mut bad_time = input("Oslo", "Bergen", 1);
        bad_time.time = "quarter past".into();
        assert!(matches!(
            trips.create_trip(&alice(), "Alice", bad_time).await,
            Err(AppError::BadRequest(_))
        ));
        let mut no_seats = input("Oslo", "Bergen", 1);
        no_seats.seats = 0;
        assert!(trips.create_trip(&alice(), "Alice", no_seats).await.is_err());
        assert!(trips.create_trip(&alice(), "Alice", input(" ", "Bergen", 1)).await.is_err());
    }
}
