use crate::api::{not_found, AppState, ErrorResponse};
use crate::models::Trip;
use crate::services;
use crate::services::trips::TripPosition;
use crate::stream::trip_updates;
use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

#[utoipa::path(
    get,
    path = "/api/trips/{company}/{id}",
    params(
        ("company" = String, Path, description = "Operator tag: trenitalia, italo, trentino-trasporti, atv"),
        ("id" = String, Path, description = "Provider trip id or train number")
    ),
    responses(
        (status = 200, description = "Normalized realtime trip", body = Trip),
        (status = 404, description = "No such trip", body = ErrorResponse)
    ),
    tag = "trips"
)]
pub async fn get_trip(
    State(state): State<AppState>,
    Path((company, id)): Path<(String, String)>,
) -> Response {
    match services::trips::fetch_trip(&state, &company, &id).await {
        Some(trip) => Json(trip).into_response(),
        None => not_found("trip").into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/trips/{company}/{id}/position",
    params(
        ("company" = String, Path, description = "Operator tag"),
        ("id" = String, Path, description = "Provider trip id or train number")
    ),
    responses(
        (status = 200, description = "Positioning snapshot: fractional stop index and delay severity, evaluated at request time", body = TripPosition),
        (status = 404, description = "No such trip", body = ErrorResponse)
    ),
    tag = "trips"
)]
pub async fn get_trip_position(
    State(state): State<AppState>,
    Path((company, id)): Path<(String, String)>,
) -> Response {
    match services::trips::trip_position(&state, &company, &id).await {
        Some(position) => Json(position).into_response(),
        None => not_found("trip").into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/trips/{company}/{id}/stream",
    params(
        ("company" = String, Path, description = "Operator tag"),
        ("id" = String, Path, description = "Provider trip id or train number")
    ),
    responses(
        (status = 200, description = "SSE stream of trip snapshots, pushed only on change")
    ),
    tag = "trips"
)]
pub async fn stream_trip(
    State(state): State<AppState>,
    Path((company, id)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let poll = state.poll.clone();
    let fetch = move || {
        let state = state.clone();
        let company = company.clone();
        let id = id.clone();
        async move { services::trips::fetch_trip(&state, &company, &id).await }
    };

    let stream = trip_updates(poll, fetch).map(|trip| {
        let event = match Event::default().event("trip").json_data(&trip) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize trip event");
                Event::default().comment("serialization failure")
            }
        };
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
