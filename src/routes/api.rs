use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::{stream::BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::join_request::RequestStatus,
    state::AppState,
    store::TypedSubscription,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests/:side/:status", get(requests_snapshot))
        .route("/requests/:side/:status/live", get(requests_live))
}

/// Which copy of the requests to read: the owner's inbox or the requester's sent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Side {
    Owner,
    Requester,
}

async fn requests_snapshot(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((side, status)): Path<(Side, RequestStatus)>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    Ok(match side {
        Side::Owner => {
            let view = state.requests.owner_view(user).await?;
            Json(view.into_status(status)).into_response()
        }
        Side::Requester => {
            let view = state.requests.requester_view(user).await?;
            Json(view.into_status(status)).into_response()
        }
    })
}

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;

async fn requests_live(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((side, status)): Path<(Side, RequestStatus)>,
) -> Result<Sse<EventStream>, AppError> {
    let user = current.require_user()?;
    debug!(user = %user.uuid, ?side, %status, "live request view opened");
    let events = match side {
        Side::Owner => snapshot_events(state.requests.watch_owner_view(user, status)?),
        Side::Requester => snapshot_events(state.requests.watch_requester_view(user, status)?),
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// One `snapshot` event per result set; a failed read ends the stream with an `error` event.
fn snapshot_events<T>(subscription: TypedSubscription<T>) -> EventStream
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    subscription
        .into_stream()
        .map(|snapshot| match snapshot {
            Ok(records) => Event::default().event("snapshot").json_data(records),
            Err(err) => {
                warn!("live request view failed: {err}");
                Ok(Event::default().event("error").data(err.to_string()))
            }
        })
        .boxed()
}
