/// Nearby-departures aggregation: discover stops around a coordinate,
/// fan out to the operators that serve them, and merge the results into
/// one deduplicated, time-ordered feed.
use crate::api::AppState;
use crate::models::Departure;
use crate::providers::trentino::NearbyStop;
use crate::rt::departures::build_departures;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;

/// Radius of the stop-discovery bounding box around the coordinate.
const NEARBY_RADIUS_M: f64 = 100.0;
/// Metres per degree of latitude.
const M_PER_DEG_LAT: f64 = 111_320.0;

/// All upcoming departures from stops within ~100m of the coordinate.
/// A failing operator or stop contributes nothing; it never fails the
/// whole feed.
pub async fn nearby_departures(state: &AppState, lat: f64, lon: f64) -> Vec<Departure> {
    let dlat = NEARBY_RADIUS_M / M_PER_DEG_LAT;
    let dlon = NEARBY_RADIUS_M / (M_PER_DEG_LAT * lat.to_radians().cos().abs().max(0.01));

    let stops = match state
        .motis
        .stops_in_area((lat - dlat, lon - dlon), (lat + dlat, lon + dlon))
        .await
    {
        Ok(stops) => stops,
        Err(e) => {
            tracing::warn!(lat, lon, error = %e, "stop discovery failed");
            return Vec::new();
        }
    };

    let mut trentino_stops = Vec::new();
    for stop in &stops {
        // Planner stop ids carry the operator feed tag as a prefix,
        // e.g. "ttu_21825" for a Trentino urban stop.
        let Some((prefix, raw_id)) = stop.stop_id.split_once('_') else {
            continue;
        };
        match prefix {
            "ttu" | "tte" => {
                if let Ok(id) = raw_id.parse::<i64>() {
                    let kind = if prefix == "ttu" { "U" } else { "E" };
                    trentino_stops.push(NearbyStop {
                        id,
                        kind: kind.to_string(),
                    });
                }
            }
            // ATV exposes no per-stop departure feed.
            "atv" => tracing::debug!(stop = %stop.stop_id, "no departures feed for operator"),
            _ => {}
        }
    }

    let now = Utc::now();
    let fetches = trentino_stops.iter().map(|stop| async move {
        let visits = state.trentino.departures(std::slice::from_ref(stop)).await;
        build_departures(visits, &stop.id.to_string(), now)
    });

    // Merge per-stop feeds; a trip serving two nearby stops shows once.
    let mut seen = HashSet::new();
    let mut merged: Vec<Departure> = Vec::new();
    for batch in join_all(fetches).await {
        for departure in batch {
            if seen.insert(departure.id.clone()) {
                merged.push(departure);
            }
        }
    }
    merged.sort_by_key(|d| d.departure_time);
    merged
}
