/// Trip lookup dispatch: route a `{company}/{id}` request to the right
/// provider adapter and apply cross-source reconciliation where a
/// second signal exists.
use crate::api::AppState;
use crate::models::{Trip, TripStatus};
use crate::providers::viaggiatreno::corroborate_delay;
use crate::rt::position::progress_index;
use crate::rt::time::{delay_severity, DelaySeverity};
use crate::stations::StationDirectory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Fetch one trip by company tag. `None` means not found (or upstream
/// unreachable after retries); the distinction is deliberately dropped.
pub async fn fetch_trip(state: &AppState, company: &str, id: &str) -> Option<Trip> {
    match company {
        "trenitalia" => {
            let mut trip = state.viaggiatreno.fetch_trip(id).await?;
            // The station departure board is the corroborating delay
            // source for running Trenitalia trips.
            if trip.status == TripStatus::Active {
                if let Some(station) = board_station(&trip, &state.stations) {
                    let board = state.viaggiatreno.fetch_board(&station).await;
                    corroborate_delay(&mut trip, &board);
                }
            }
            Some(trip)
        }
        "italo" => state.italo.fetch_trip(id, &state.stations).await,
        "trentino-trasporti" => state.trentino.fetch_trip(id).await,
        "atv" => state.cicero.fetch_trip(id).await,
        other => {
            tracing::debug!(company = other, "no adapter for company");
            None
        }
    }
}

/// Where a vehicle is along its stop sequence, evaluated at request
/// time. Cheap to poll on its own clock for map animation; the full
/// payload does not change between stop events, this does.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TripPosition {
    /// Fractional index into the non-canceled stop sequence: -1 before
    /// departure, an integer while dwelling, `i + f` between stops.
    pub position_index: f64,
    pub current_stop_index: i32,
    pub delay: Option<i32>,
    pub delay_severity: DelaySeverity,
    pub status: TripStatus,
    pub last_update: Option<DateTime<Utc>>,
}

/// Position snapshot of an already-normalized trip as of `now`.
pub fn position_snapshot(trip: &Trip, now: DateTime<Utc>) -> TripPosition {
    TripPosition {
        position_index: progress_index(&trip.stops, trip.delay, trip.current_stop_index, now),
        current_stop_index: trip.current_stop_index,
        delay: trip.delay,
        delay_severity: delay_severity(trip.delay),
        status: trip.status,
        last_update: trip.last_update,
    }
}

/// Fetch a trip and reduce it to its position snapshot.
pub async fn trip_position(state: &AppState, company: &str, id: &str) -> Option<TripPosition> {
    let trip = fetch_trip(state, company, id).await?;
    Some(position_snapshot(&trip, Utc::now()))
}

/// Station whose board is most likely to carry the train right now:
/// the last detection point, falling back to the origin.
fn board_station(trip: &Trip, stations: &StationDirectory) -> Option<String> {
    trip.last_known_location
        .as_deref()
        .and_then(|name| stations.find_by_name(name))
        .or_else(|| stations.find_by_name(&trip.origin))
        .map(|record| record.id.clone())
}
