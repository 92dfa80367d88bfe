/// Itinerary dedup, scoring and realtime-adjusted bounds.
///
/// Journey planners return near-duplicate itineraries (same vehicles,
/// slightly different walk geometry). Each itinerary gets a signature
/// built from its non-walk legs; among itineraries sharing a signature
/// only the best one survives. All functions here are pure; the HTTP
/// layer performs the per-leg realtime fetches and feeds the results
/// back through [`apply_leg_realtime`].
use crate::models::{Itinerary, Leg, LegRealTime};
use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Upper bound on itineraries kept after dedup; everything past this is
/// noise and would multiply the enrichment fan-out.
pub const MAX_ITINERARIES: usize = 5;

/// Legs whose endpoints are closer than this are planner artifacts.
const MIN_LEG_DISTANCE_M: f64 = 100.0;

lazy_static! {
    // "Trento, Stazione di Trento" / "Trento, Stazione FS"
    static ref PLACE_COMMA_STATION: Regex =
        Regex::new(r"^(?P<place>.+?),\s*Stazione(?:\s+di\s+(?P<rest>.+))?\s*$").unwrap();
    // "Stazione di Rovereto"
    static ref STATION_OF: Regex = Regex::new(r"^Stazione\s+di\s+(?P<place>.+)$").unwrap();
    // "Mori (Trento), Mori"
    static ref PLACE_PROVINCE_PLACE: Regex =
        Regex::new(r"^(?P<place>.+?)\s*\([^)]*\),\s*(?P<repeat>.+)$").unwrap();
}

/// Collapse redundant Italian station phrasings to the bare place name.
/// Cosmetic only; signatures are computed on raw identifiers.
pub fn clean_display_name(name: &str) -> String {
    if let Some(caps) = PLACE_COMMA_STATION.captures(name) {
        let place = caps["place"].trim();
        let redundant = caps
            .name("rest")
            .map(|r| r.as_str().trim().eq_ignore_ascii_case(place))
            .unwrap_or(true);
        if redundant {
            return place.to_string();
        }
    }
    if let Some(caps) = STATION_OF.captures(name) {
        return caps["place"].trim().to_string();
    }
    if let Some(caps) = PLACE_PROVINCE_PLACE.captures(name) {
        let place = caps["place"].trim();
        if caps["repeat"].trim().eq_ignore_ascii_case(place) {
            return place.to_string();
        }
    }
    name.trim().to_string()
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

fn is_degenerate(leg: &Leg) -> bool {
    match (leg.from.lat, leg.from.lon, leg.to.lat, leg.to.lon) {
        (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) => {
            haversine_m(lat1, lon1, lat2, lon2) < MIN_LEG_DISTANCE_M
        }
        _ => false,
    }
}

/// Identity of an itinerary: which vehicles it rides and when.
///
/// Non-walk legs contribute `{shortNameOrTripId}_{scheduledStart}`,
/// pipe-joined; a leg with neither name nor id falls back to its
/// endpoint names. An all-walk itinerary signs by its time bounds.
pub fn signature(itinerary: &Itinerary) -> String {
    let parts: Vec<String> = itinerary
        .legs
        .iter()
        .filter(|l| !l.is_walk())
        .map(|l| {
            let ident = l
                .trip_short_name
                .clone()
                .or_else(|| l.trip_id.clone())
                .unwrap_or_else(|| format!("{}_{}", l.from.name, l.to.name));
            format!("{}_{}", ident, l.scheduled_start_time.timestamp())
        })
        .collect();

    if parts.is_empty() {
        return format!(
            "WALK_{}_{}",
            itinerary.start_time.timestamp(),
            itinerary.end_time.timestamp()
        );
    }
    parts.join("|")
}

fn has_realtime(itinerary: &Itinerary) -> bool {
    itinerary
        .legs
        .iter()
        .any(|l| l.realtime || l.real_time.is_some())
}

fn walk_leg_count(itinerary: &Itinerary) -> usize {
    itinerary.legs.iter().filter(|l| l.is_walk()).count()
}

/// True when `candidate` should replace `incumbent` under the same
/// signature: realtime-enriched wins, then fewer walking legs.
fn beats(candidate: &Itinerary, incumbent: &Itinerary) -> bool {
    match (has_realtime(candidate), has_realtime(incumbent)) {
        (true, false) => true,
        (false, true) => false,
        _ => walk_leg_count(candidate) < walk_leg_count(incumbent),
    }
}

/// Tidy a raw planner itinerary: drop degenerate legs and clean the
/// endpoint display names.
pub fn tidy(mut itinerary: Itinerary) -> Itinerary {
    itinerary.legs.retain(|l| !is_degenerate(l));
    for leg in &mut itinerary.legs {
        leg.from.name = clean_display_name(&leg.from.name);
        leg.to.name = clean_display_name(&leg.to.name);
    }
    itinerary
}

/// Dedup by signature keeping the best candidate per group, preserving
/// first-seen order, capped at [`MAX_ITINERARIES`].
pub fn merge_itineraries(candidates: Vec<Itinerary>) -> Vec<Itinerary> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Itinerary> = HashMap::new();

    for candidate in candidates.into_iter().map(tidy) {
        let sig = signature(&candidate);
        match best.get(&sig) {
            None => {
                order.push(sig.clone());
                best.insert(sig, candidate);
            }
            Some(incumbent) if beats(&candidate, incumbent) => {
                best.insert(sig, candidate);
            }
            Some(_) => {}
        }
    }

    order
        .into_iter()
        .filter_map(|sig| best.remove(&sig))
        .take(MAX_ITINERARIES)
        .collect()
}

/// Attach fetched realtime data to a leg and shift its running times by
/// the reported delay. Scheduled times are left untouched.
pub fn apply_leg_realtime(leg: &mut Leg, rt: LegRealTime) {
    if let Some(delay) = rt.delay {
        let shift = Duration::minutes(delay as i64);
        leg.start_time = leg.scheduled_start_time + shift;
        leg.end_time = leg.scheduled_end_time + shift;
    }
    leg.real_time = Some(rt);
}

fn leg_delay(leg: &Leg) -> Option<i32> {
    leg.real_time.as_ref().and_then(|rt| rt.delay)
}

/// Recompute itinerary bounds from its delay-adjusted boundary legs.
///
/// A leading or trailing walk leg carries no delay of its own; it
/// inherits the adjacent non-walk leg's delay so the rider still sees
/// when they actually need to start walking.
pub fn recompute_bounds(itinerary: &mut Itinerary) {
    let Some(first) = itinerary.legs.first() else {
        return;
    };
    let last = itinerary.legs.last().unwrap_or(first);

    let start_delay = if first.is_walk() {
        itinerary.legs.iter().find(|l| !l.is_walk()).and_then(leg_delay)
    } else {
        leg_delay(first)
    };
    let end_delay = if last.is_walk() {
        itinerary
            .legs
            .iter()
            .rev()
            .find(|l| !l.is_walk())
            .and_then(leg_delay)
    } else {
        leg_delay(last)
    };

    let scheduled_start = itinerary.legs.first().map(|l| l.scheduled_start_time);
    let scheduled_end = itinerary.legs.last().map(|l| l.scheduled_end_time);

    if let Some(start) = scheduled_start {
        itinerary.start_time = start + Duration::minutes(start_delay.unwrap_or(0) as i64);
    }
    if let Some(end) = scheduled_end {
        itinerary.end_time = end + Duration::minutes(end_delay.unwrap_or(0) as i64);
    }
    itinerary.duration = (itinerary.end_time - itinerary.start_time).num_minutes();
}

/// Recompute bounds for every realtime-touched itinerary.
///
/// Must run after [`merge_itineraries`]: tidying may drop a degenerate
/// boundary walk leg, and bounds derived earlier would still reflect
/// the removed leg's schedule.
pub fn finalize_bounds(itineraries: &mut [Itinerary]) {
    for itinerary in itineraries {
        if itinerary.legs.iter().any(|l| l.real_time.is_some()) {
            recompute_bounds(itinerary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Place, TripStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, h, m, 0).unwrap()
    }

    fn place(name: &str, lat: f64, lon: f64) -> Place {
        Place {
            name: name.into(),
            lat: Some(lat),
            lon: Some(lon),
            departure: None,
            scheduled_departure: None,
            arrival: None,
            scheduled_arrival: None,
        }
    }

    fn leg(mode: &str, short_name: Option<&str>, start: DateTime<Utc>, end: DateTime<Utc>) -> Leg {
        Leg {
            mode: mode.into(),
            from: place("Trento", 46.072, 11.119),
            to: place("Rovereto", 45.891, 11.034),
            start_time: start,
            end_time: end,
            scheduled_start_time: start,
            scheduled_end_time: end,
            duration: (end - start).num_minutes(),
            trip_id: Some("tt:0123".into()),
            trip_short_name: short_name.map(Into::into),
            route_short_name: None,
            route_long_name: None,
            route_color: None,
            agency_name: Some("Trenitalia".into()),
            headsign: None,
            realtime: false,
            real_time: None,
        }
    }

    fn itinerary(legs: Vec<Leg>) -> Itinerary {
        let start = legs.first().map(|l| l.start_time).unwrap_or_else(|| at(9, 0));
        let end = legs.last().map(|l| l.end_time).unwrap_or_else(|| at(9, 0));
        Itinerary {
            start_time: start,
            end_time: end,
            duration: (end - start).num_minutes(),
            transfers: legs.iter().filter(|l| !l.is_walk()).count().saturating_sub(1) as u32,
            legs,
        }
    }

    #[test]
    fn signature_uses_short_name_and_scheduled_start() {
        let it = itinerary(vec![
            leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30)),
            leg("BUS", Some("5"), at(9, 40), at(10, 0)),
        ]);
        let start1 = at(9, 0).timestamp();
        let start2 = at(9, 40).timestamp();
        assert_eq!(signature(&it), format!("RV 2468_{start1}|5_{start2}"));
    }

    #[test]
    fn signature_ignores_walk_legs_and_falls_back_to_endpoints() {
        let mut named = leg("RAIL", None, at(9, 0), at(9, 30));
        named.trip_id = None;
        let with_walk = itinerary(vec![leg("WALK", None, at(8, 50), at(9, 0)), named.clone()]);
        let without_walk = itinerary(vec![named]);
        assert_eq!(signature(&with_walk), signature(&without_walk));
        assert!(signature(&with_walk).starts_with("Trento_Rovereto_"));
    }

    #[test]
    fn all_walk_itinerary_signs_by_time_bounds() {
        let it = itinerary(vec![leg("WALK", None, at(9, 0), at(9, 12))]);
        assert!(signature(&it).starts_with("WALK_"));
    }

    #[test]
    fn realtime_enriched_duplicate_wins() {
        let plain = itinerary(vec![leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30))]);
        let mut enriched = plain.clone();
        enriched.legs[0].real_time = Some(LegRealTime {
            delay: Some(5),
            tracked: true,
            url: None,
            status: TripStatus::Active,
            info: vec![],
        });

        let kept = merge_itineraries(vec![plain, enriched.clone()]);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].legs[0].real_time.is_some());

        // Order flipped: the enriched one still wins.
        let mut plain2 = itinerary(vec![leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30))]);
        plain2.legs[0].real_time = None;
        let kept = merge_itineraries(vec![enriched, plain2]);
        assert!(kept[0].legs[0].real_time.is_some());
    }

    #[test]
    fn fewer_walk_legs_breaks_ties() {
        let rail = leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30));
        let two_walks = itinerary(vec![
            leg("WALK", None, at(8, 45), at(8, 55)),
            rail.clone(),
            leg("WALK", None, at(9, 30), at(9, 40)),
        ]);
        let one_walk = itinerary(vec![leg("WALK", None, at(8, 50), at(8, 58)), rail]);

        let kept = merge_itineraries(vec![two_walks, one_walk]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].legs.len(), 2);
    }

    #[test]
    fn output_is_capped() {
        let many: Vec<Itinerary> = (0..8)
            .map(|i| {
                let name = format!("R {i}");
                itinerary(vec![leg("RAIL", Some(name.as_str()), at(9, i), at(10, 0))])
            })
            .collect();
        assert_eq!(merge_itineraries(many).len(), MAX_ITINERARIES);
    }

    #[test]
    fn degenerate_legs_are_dropped() {
        let mut stub = leg("WALK", None, at(9, 0), at(9, 1));
        // ~30m apart
        stub.from = place("A", 46.0720, 11.1190);
        stub.to = place("A fronte", 46.07225, 11.1191);
        let real = leg("RAIL", Some("RV 2468"), at(9, 5), at(9, 30));

        let kept = merge_itineraries(vec![itinerary(vec![stub, real])]);
        assert_eq!(kept[0].legs.len(), 1);
        assert_eq!(kept[0].legs[0].mode, "RAIL");
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Trento FS to Rovereto FS is roughly 21.5 km.
        let d = haversine_m(46.0722, 11.1193, 45.8911, 11.0339);
        assert!((d - 21_500.0).abs() < 1_000.0, "got {d}");
        assert_eq!(haversine_m(46.0, 11.0, 46.0, 11.0), 0.0);
    }

    #[test]
    fn display_names_collapse_station_phrasings() {
        assert_eq!(clean_display_name("Stazione di Rovereto"), "Rovereto");
        assert_eq!(clean_display_name("Trento, Stazione di Trento"), "Trento");
        assert_eq!(clean_display_name("Trento, Stazione"), "Trento");
        assert_eq!(clean_display_name("Mori (Trento), Mori"), "Mori");
        // Non-redundant names pass through.
        assert_eq!(clean_display_name("Trento, Piazza Dante"), "Trento, Piazza Dante");
        assert_eq!(clean_display_name("Verona Porta Nuova"), "Verona Porta Nuova");
    }

    #[test]
    fn bounds_follow_delay_adjusted_boundary_legs() {
        let mut it = itinerary(vec![
            leg("WALK", None, at(8, 50), at(9, 0)),
            leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30)),
        ]);
        apply_leg_realtime(
            &mut it.legs[1],
            LegRealTime {
                delay: Some(10),
                tracked: true,
                url: None,
                status: TripStatus::Active,
                info: vec![],
            },
        );
        recompute_bounds(&mut it);

        // Leading walk leg inherits the train's delay.
        assert_eq!(it.start_time, at(9, 0));
        assert_eq!(it.end_time, at(9, 40));
        assert_eq!(it.duration, 40);
        assert_eq!(it.legs[1].start_time, at(9, 10));
    }

    #[test]
    fn bounds_follow_surviving_legs_after_merge() {
        // Degenerate leading walk (~30m) that tidying will drop.
        let mut stub = leg("WALK", None, at(8, 50), at(9, 0));
        stub.from = place("A", 46.0720, 11.1190);
        stub.to = place("A fronte", 46.07225, 11.1191);
        let mut rail = leg("RAIL", Some("RV 2468"), at(9, 0), at(9, 30));
        apply_leg_realtime(
            &mut rail,
            LegRealTime {
                delay: Some(10),
                tracked: true,
                url: None,
                status: TripStatus::Active,
                info: vec![],
            },
        );

        let mut kept = merge_itineraries(vec![itinerary(vec![stub, rail])]);
        finalize_bounds(&mut kept);

        // The dropped walk's 08:50 schedule must not leak into the bounds.
        assert_eq!(kept[0].legs.len(), 1);
        assert_eq!(kept[0].start_time, at(9, 10));
        assert_eq!(kept[0].end_time, at(9, 40));
        assert_eq!(kept[0].duration, 30);
    }
}
