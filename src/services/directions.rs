/// Journey planning: query the planner, enrich each transit leg with
/// live tracking from the operator that runs it, then dedup and tidy
/// the itineraries for display.
use crate::api::AppState;
use crate::models::{Directions, Itinerary, Leg, LegRealTime, Trip};
use crate::providers::motis::convert_itinerary;
use crate::providers::ProviderError;
use crate::rt::directions::{apply_leg_realtime, finalize_bounds, merge_itineraries, tidy};
use chrono::{DateTime, Utc};
use futures::future::join_all;

pub async fn plan(
    state: &AppState,
    from: (f64, f64),
    to: (f64, f64),
    time: &str,
) -> Result<Directions, ProviderError> {
    let response = state.motis.plan(from, to, time).await?;
    let now = Utc::now();

    // Enrich before dedup: same-signature selection prefers the
    // realtime-tracked variant.
    let enriched = join_all(
        response
            .itineraries
            .into_iter()
            .map(convert_itinerary)
            .map(|itinerary| enrich_itinerary(state, itinerary, now)),
    )
    .await;

    // Bounds are derived only after merging: tidying may drop a
    // degenerate boundary walk leg the bounds would otherwise reflect.
    let mut trips = merge_itineraries(enriched);
    finalize_bounds(&mut trips);
    let direct = response
        .direct
        .into_iter()
        .map(convert_itinerary)
        .map(tidy)
        .collect();

    Ok(Directions {
        trips,
        direct,
        page_cursor: response.page_cursor,
    })
}

/// Attach live data to every transit leg of one itinerary.
///
/// Only itineraries starting today are enriched; providers key live
/// lookups on "today's run of this trip", so an enrichment against a
/// future date would track the wrong vehicle.
async fn enrich_itinerary(
    state: &AppState,
    mut itinerary: Itinerary,
    now: DateTime<Utc>,
) -> Itinerary {
    if itinerary.start_time.date_naive() != now.date_naive() {
        return itinerary;
    }

    let fetches = itinerary.legs.iter().map(|leg| leg_realtime(state, leg));
    let updates = join_all(fetches).await;

    for (leg, update) in itinerary.legs.iter_mut().zip(updates) {
        if let Some(rt) = update {
            apply_leg_realtime(leg, rt);
        }
    }
    itinerary
}

/// Route a leg to the adapter tracking its operator. `None` when the
/// leg is a walk, the operator is untracked, or the lookup failed.
async fn leg_realtime(state: &AppState, leg: &Leg) -> Option<LegRealTime> {
    if leg.is_walk() {
        return None;
    }
    let agency = leg.agency_name.as_deref()?.to_lowercase();

    if agency.contains("trentino") {
        let id = trentino_trip_id(leg.trip_id.as_deref()?)?;
        return Some(state.trentino.leg_realtime(id).await);
    }

    if agency.contains("verona") || agency == "atv" {
        let id = cicero_run_id(leg.trip_id.as_deref()?)?;
        let trip = state.cicero.fetch_trip(&id).await?;
        return Some(realtime_from_trip(trip, "atv", &id));
    }

    if agency.contains("trenitalia")
        || agency.contains("trenord")
        || agency.contains("alto adige")
        || agency.contains("sad")
    {
        let number = train_number(leg.trip_short_name.as_deref()?)?;
        let trip = state.viaggiatreno.fetch_trip(&number).await?;
        return Some(realtime_from_trip(trip, "trenitalia", &number));
    }

    None
}

/// GTFS trip ids from the planner are namespaced, e.g.
/// "tte_0002878692024..."; the operator feed wants the bare tail.
fn trentino_trip_id(raw: &str) -> Option<&str> {
    raw.rsplit('_').next().filter(|s| !s.is_empty())
}

/// ATV run ids come through as "atv_ATV#1:12345_ATV"; the Cicero
/// service wants the bare run number.
fn cicero_run_id(raw: &str) -> Option<String> {
    let tail = raw.rsplit(':').next()?;
    let id = tail.trim_end_matches("_ATV");
    (!id.is_empty()).then(|| id.to_string())
}

/// "RV 2468" -> "2468". Rail legs are tracked by bare train number.
fn train_number(short_name: &str) -> Option<String> {
    let digits: String = short_name.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

fn realtime_from_trip(trip: Trip, company: &str, id: &str) -> LegRealTime {
    LegRealTime {
        tracked: trip.delay.is_some(),
        delay: trip.delay,
        url: Some(format!("/track/{}/{}", company, id)),
        status: trip.status,
        info: trip.info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_trip_ids_reduce_to_operator_ids() {
        assert_eq!(
            trentino_trip_id("tte_0002878692024091120241214"),
            Some("0002878692024091120241214")
        );
        assert_eq!(cicero_run_id("atv_ATV#1:12345_ATV").as_deref(), Some("12345"));
        assert_eq!(cicero_run_id("atv_ATV#1:").as_deref(), None);
    }

    #[test]
    fn train_numbers_are_extracted_from_short_names() {
        assert_eq!(train_number("RV 2468").as_deref(), Some("2468"));
        assert_eq!(train_number("2468").as_deref(), Some("2468"));
        assert_eq!(train_number("Freccia").as_deref(), None);
    }
}
