use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::trip::{Coords, Trip},
    services::{
        emissions::{self, RouteComparison},
        requests::IssueJoinRequest,
        trips::{TripInput, TripSearch},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(trips_list))
        .route("/new", get(trip_new_form).post(trip_new_submit))
        .route("/:id", get(trip_detail))
        .route("/:id/join", post(trip_join))
}

struct TripSummary {
    id: String,
    owner_name: String,
    source: String,
    destination: String,
    date: String,
    time: String,
    seats_left: u32,
}

impl From<Trip> for TripSummary {
    fn from(trip: Trip) -> Self {
        Self {
            seats_left: trip.seats_left(),
            id: trip.id,
            owner_name: trip.user.name,
            source: trip.source,
            destination: trip.destination,
            date: trip.date.to_string(),
            time: trip.time,
        }
    }
}

#[derive(Template)]
#[template(path = "trips/list.html")]
struct TripsListTemplate {
    logged_in: bool,
    trips: Vec<TripSummary>,
    source: String,
    destination: String,
    date: String,
    searching: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    source: Option<String>,
    destination: Option<String>,
    date: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Date must look like YYYY-MM-DD.".into()))
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let source = non_empty(params.source);
    let destination = non_empty(params.destination);
    let date_raw = non_empty(params.date);
    let search = TripSearch {
        source: source.clone(),
        destination: destination.clone(),
        date: date_raw.as_deref().map(parse_date).transpose()?,
    };
    let trips = state.trips.search(&search).await?;
    Ok(AskamaTemplateResponse::into_response(TripsListTemplate {
        logged_in: current.0.is_some(),
        trips: trips.into_iter().map(TripSummary::from).collect(),
        searching: !search.is_empty(),
        source: source.unwrap_or_default(),
        destination: destination.unwrap_or_default(),
        date: date_raw.unwrap_or_default(),
    }))
}

#[derive(Template, Default)]
#[template(path = "trips/new.html")]
struct TripNewTemplate {
    logged_in: bool,
    error_message: String,
    source: String,
    destination: String,
    date: String,
    time: String,
    seats: String,
}

async fn trip_new_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(TripNewTemplate {
        logged_in: true,
        seats: "1".into(),
        ..TripNewTemplate::default()
    }))
}

#[derive(Deserialize)]
struct TripForm {
    source: String,
    destination: String,
    date: String,
    time: String,
    seats: String,
    distance: Option<String>,
    source_lat: Option<String>,
    source_lng: Option<String>,
    destination_lat: Option<String>,
    destination_lng: Option<String>,
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, label: &str) -> Result<Option<T>, AppError> {
    match non_empty(raw) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{label} must be a number."))),
        None => Ok(None),
    }
}

fn parse_coords(lat: Option<String>, lng: Option<String>) -> Result<Option<Coords>, AppError> {
    let lat = parse_number::<f64>(lat, "Latitude")?;
    let lng = parse_number::<f64>(lng, "Longitude")?;
    Ok(lat.zip(lng).map(|(lat, lng)| Coords { lat, lng }))
}

impl TripForm {
    fn to_input(&self) -> Result<TripInput, AppError> {
        let seats = parse_number::<u32>(Some(self.seats.clone()), "Seats")?
            .ok_or_else(|| AppError::BadRequest("Please enter the number of seats.".into()))?;
        Ok(TripInput {
            source: self.source.clone(),
            destination: self.destination.clone(),
            source_coords: parse_coords(self.source_lat.clone(), self.source_lng.clone())?,
            destination_coords: parse_coords(
                self.destination_lat.clone(),
                self.destination_lng.clone(),
            )?,
            date: parse_date(&self.date)?,
            time: self.time.clone(),
            seats,
            distance: parse_number(self.distance.clone(), "Distance")?,
        })
    }
}

async fn trip_new_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<TripForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let created = match form.to_input() {
        Ok(input) => {
            let owner_name = state.profiles.display_name(user).await?;
            state.trips.create_trip(user, &owner_name, input).await
        }
        Err(err) => Err(err),
    };
    match created {
        Ok(trip) => Ok(Redirect::to(&format!("/trips/{}", trip.id)).into_response()),
        Err(AppError::BadRequest(message)) => Ok((
            StatusCode::BAD_REQUEST,
            AskamaTemplateResponse::into_response(TripNewTemplate {
                logged_in: true,
                error_message: message,
                source: form.source,
                destination: form.destination,
                date: form.date,
                time: form.time,
                seats: form.seats,
            }),
        )
            .into_response()),
        Err(err) => Err(err),
    }
}

#[derive(Template)]
#[template(path = "trips/detail.html")]
struct TripDetailTemplate {
    logged_in: bool,
    trip: TripSummary,
    seats: u32,
    distance: String,
    comparison: Option<RouteComparison>,
    can_join: bool,
    is_owner: bool,
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let trip = state.trips.get(&trip_id).await?.ok_or(AppError::NotFound)?;
    let is_owner = current
        .0
        .as_ref()
        .is_some_and(|user| user.uuid == trip.owner_id());
    let can_join = current.0.is_some() && !is_owner && trip.seats_left() > 0;
    Ok(AskamaTemplateResponse::into_response(TripDetailTemplate {
        logged_in: current.0.is_some(),
        seats: trip.seats,
        distance: trip
            .distance
            .map(|km| format!("{km:.1} km"))
            .unwrap_or_else(|| "unknown".into()),
        comparison: trip.distance.map(emissions::compare_route),
        can_join,
        is_owner,
        trip: trip.into(),
    }))
}

async fn trip_join(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get(&trip_id).await?.ok_or(AppError::NotFound)?;
    let requester_name = state.profiles.display_name(user).await?;
    state
        .requests
        .issue_join_request(
            user,
            IssueJoinRequest {
                trip_id: trip.id.clone(),
                trip_owner_id: trip.owner_id().to_string(),
                requester_name,
                source: trip.source,
                destination: trip.destination,
            },
        )
        .await?;
    Ok(Redirect::to("/me/sent"))
}
