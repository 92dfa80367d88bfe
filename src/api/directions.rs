use crate::api::{internal_error, AppState, ErrorResponse};
use crate::models::Directions;
use crate::services;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DirectionsQuery {
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    /// RFC 3339 departure time; defaults to now.
    pub time: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/directions",
    params(DirectionsQuery),
    responses(
        (status = 200, description = "Planned itineraries with realtime enrichment, deduplicated", body = Directions),
        (status = 500, description = "Planner unreachable", body = ErrorResponse)
    ),
    tag = "directions"
)]
pub async fn get_directions(
    State(state): State<AppState>,
    Query(query): Query<DirectionsQuery>,
) -> Response {
    let time = query
        .time
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    match services::directions::plan(
        &state,
        (query.from_lat, query.from_lon),
        (query.to_lat, query.to_lon),
        &time,
    )
    .await
    {
        Ok(directions) => Json(directions).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
