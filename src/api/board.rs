use crate::api::{not_found, AppState, ErrorResponse};
use crate::providers::viaggiatreno::BoardTrain;
use crate::services;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};

#[utoipa::path(
    get,
    path = "/api/board/{station}",
    params(
        ("station" = String, Path, description = "Canonical station id (S02430) or display name")
    ),
    responses(
        (status = 200, description = "Departure board rows for the station", body = Vec<BoardTrain>),
        (status = 404, description = "Station not in the directory", body = ErrorResponse)
    ),
    tag = "board"
)]
pub async fn get_board(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Response {
    match services::board::station_board(&state, &station).await {
        Some(rows) => Json(rows).into_response(),
        None => not_found("station").into_response(),
    }
}
