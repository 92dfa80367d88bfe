/// Station departure board, backed by the Viaggiatreno `partenze` feed.
use crate::api::AppState;
use crate::providers::viaggiatreno::BoardTrain;

/// Departure board for a station given by canonical id ("S02430") or
/// display name ("Verona Porta Nuova"). `None` when the station is not
/// in the directory.
pub async fn station_board(state: &AppState, station: &str) -> Option<Vec<BoardTrain>> {
    let id = if state.stations.get(station).is_some() {
        station.to_string()
    } else {
        state.stations.find_by_name(station)?.id.clone()
    };

    let rows = state.viaggiatreno.fetch_board(&id).await;
    Some(rows.into_iter().map(BoardTrain::from).collect())
}
