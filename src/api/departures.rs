use crate::api::AppState;
use crate::models::Departure;
use crate::services;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeparturesQuery {
    pub lat: f64,
    pub lon: f64,
}

#[utoipa::path(
    get,
    path = "/api/departures",
    params(DeparturesQuery),
    responses(
        (status = 200, description = "Upcoming departures from stops near the coordinate, deduplicated and sorted by effective time", body = Vec<Departure>)
    ),
    tag = "departures"
)]
pub async fn get_departures(
    State(state): State<AppState>,
    Query(query): Query<DeparturesQuery>,
) -> Json<Vec<Departure>> {
    Json(services::departures::nearby_departures(&state, query.lat, query.lon).await)
}
