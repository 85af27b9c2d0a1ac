use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Local, Utc};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::join_request::{Decision, JoinRequest, SentRequest},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/me/requests") }))
        .route("/requests", get(received_requests))
        .route("/requests/:trip_id/:requester_id", post(resolve_request))
        .route("/sent", get(sent_requests))
        .route("/notifications", get(notifications_list))
        .route("/profile", get(profile_form).post(profile_submit))
}

struct RequestRow {
    trip_id: String,
    requester_id: String,
    requester_name: String,
    route: String,
    requested_at: String,
}

impl From<JoinRequest> for RequestRow {
    fn from(request: JoinRequest) -> Self {
        Self {
            route: format!("{} → {}", request.source, request.destination),
            requested_at: format_timestamp(request.timestamp),
            trip_id: request.trip_id,
            requester_id: request.requester_id,
            requester_name: request.requester_name,
        }
    }
}

#[derive(Template)]
#[template(path = "user/requests.html")]
struct ReceivedRequestsTemplate {
    logged_in: bool,
    owner_id: String,
    pending: Vec<RequestRow>,
    accepted: Vec<RequestRow>,
    declined: Vec<RequestRow>,
}

async fn received_requests(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let view = state.requests.owner_view(user).await?;
    Ok(AskamaTemplateResponse::into_response(
        ReceivedRequestsTemplate {
            logged_in: true,
            owner_id: user.uuid.clone(),
            pending: view.pending.into_iter().map(RequestRow::from).collect(),
            accepted: view.accepted.into_iter().map(RequestRow::from).collect(),
            declined: view.declined.into_iter().map(RequestRow::from).collect(),
        },
    ))
}

#[derive(Deserialize)]
struct ResolveForm {
    decision: String,
    trip_owner_id: Option<String>,
}

async fn resolve_request(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, requester_id)): Path<(String, String)>,
    Form(form): Form<ResolveForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let decision: Decision = form.decision.parse()?;
    let trip_owner_id = form.trip_owner_id.unwrap_or_else(|| user.uuid.clone());
    state
        .requests
        .resolve_join_request(user, &trip_owner_id, &trip_id, &requester_id, decision)
        .await?;
    Ok(Redirect::to("/me/requests"))
}

struct SentRow {
    trip_id: String,
    route: String,
    requested_at: String,
}

impl From<SentRequest> for SentRow {
    fn from(sent: SentRequest) -> Self {
        let request = sent.request;
        Self {
            route: format!("{} → {}", request.source, request.destination),
            requested_at: format_timestamp(request.timestamp),
            trip_id: request.trip_id,
        }
    }
}

#[derive(Template)]
#[template(path = "user/sent.html")]
struct SentRequestsTemplate {
    logged_in: bool,
    pending: Vec<SentRow>,
    accepted: Vec<SentRow>,
    declined: Vec<SentRow>,
}

async fn sent_requests(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let view = state.requests.requester_view(user).await?;
    Ok(AskamaTemplateResponse::into_response(SentRequestsTemplate {
        logged_in: true,
        pending: view.pending.into_iter().map(SentRow::from).collect(),
        accepted: view.accepted.into_iter().map(SentRow::from).collect(),
        declined: view.declined.into_iter().map(SentRow::from).collect(),
    }))
}

struct NotificationRow {
    trip_id: String,
    message: String,
    received_at: String,
}

#[derive(Template)]
#[template(path = "user/notifications.html")]
struct NotificationsTemplate {
    logged_in: bool,
    notifications: Vec<NotificationRow>,
}

async fn notifications_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let notifications = state
        .notifications
        .list(user)
        .await?
        .into_iter()
        .map(|n| NotificationRow {
            trip_id: n.trip_id,
            message: n.message,
            received_at: format_timestamp(n.timestamp),
        })
        .collect();
    Ok(AskamaTemplateResponse::into_response(NotificationsTemplate {
        logged_in: true,
        notifications,
    }))
}

#[derive(Template)]
#[template(path = "user/profile.html")]
struct ProfileTemplate {
    logged_in: bool,
    name: String,
    email: String,
    saved: bool,
    error_message: String,
}

async fn profile_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let name = state.profiles.display_name(user).await?;
    Ok(AskamaTemplateResponse::into_response(ProfileTemplate {
        logged_in: true,
        name,
        email: user.email.clone(),
        saved: false,
        error_message: String::new(),
    }))
}

#[derive(Deserialize)]
struct ProfileForm {
    name: String,
}

async fn profile_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    match state.profiles.save_name(user, &form.name).await {
        Ok(profile) => Ok(AskamaTemplateResponse::into_response(ProfileTemplate {
            logged_in: true,
            name: profile.name,
            email: profile.email,
            saved: true,
            error_message: String::new(),
        })),
        Err(AppError::BadRequest(message)) => Ok((
            StatusCode::BAD_REQUEST,
            AskamaTemplateResponse::into_response(ProfileTemplate {
                logged_in: true,
                name: form.name,
                email: user.email.clone(),
                saved: false,
                error_message: message,
            }),
        )
            .into_response()),
        Err(err) => Err(err),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%d.%m.%Y %H:%M")
        .to_string()
}
