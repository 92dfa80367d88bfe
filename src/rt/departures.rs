/// Filtering, deduplication and ordering of raw upcoming-departure
/// records gathered from several nearby stops and providers.
use crate::models::Departure;
use crate::rt::time::effective_time;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Reporting lag tolerated before a past departure is considered gone.
const PAST_TOLERANCE_MIN: i64 = 2;
/// Window around the selected stop's arrival in which the vehicle
/// counts as "here" regardless of index arithmetic.
const PROXIMITY_MIN: i64 = 2;

/// Scheduled passage of a trip at one stop along its own sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeEntry {
    pub stop_id: String,
    pub departure: DateTime<Utc>,
}

/// One provider record: a trip passing the rider-selected stop,
/// carrying its own stop sequence and delay signal.
#[derive(Debug, Clone, PartialEq)]
pub struct StopVisit {
    pub trip_id: String,
    pub route: String,
    pub color: Option<String>,
    pub company: Option<String>,
    pub destination: String,
    /// Raw schedule at the selected stop; delay not yet applied.
    pub scheduled_departure: DateTime<Utc>,
    pub delay: Option<i32>,
    /// Provider's pointer to the stop the vehicle will serve next.
    pub stop_next: Option<String>,
    /// True when live telemetry has been received for this run.
    pub started: bool,
    pub stop_times: Vec<StopTimeEntry>,
}

impl StopVisit {
    pub fn effective_departure(&self) -> DateTime<Utc> {
        effective_time(self.scheduled_departure, self.delay)
    }
}

/// Count of stops between the last known passed stop and the selected
/// one, scanning delay-adjusted departure times against the clock.
/// `None` when the selected stop is not on the sequence.
pub fn stops_away(
    selected_stop: &str,
    stop_times: &[StopTimeEntry],
    delay: Option<i32>,
    now: DateTime<Utc>,
) -> Option<u32> {
    let selected_index = stop_times.iter().position(|s| s.stop_id == selected_stop)?;

    let passed_index = stop_times
        .iter()
        .rposition(|s| effective_time(s.departure, delay) <= now);

    let away = match passed_index {
        // Nothing passed yet: the whole run up to the stop is ahead.
        None => selected_index as i64 + 1,
        Some(p) => selected_index as i64 - p as i64,
    };

    Some(away.max(0) as u32)
}

fn is_gone(visit: &StopVisit, selected_stop: &str, now: DateTime<Utc>) -> bool {
    let past = now - visit.effective_departure() >= Duration::minutes(PAST_TOLERANCE_MIN);
    let moved_on = visit.stop_next.as_deref() != Some(selected_stop);
    past && moved_on
}

/// A circular run that starts and ends at the selected stop produces a
/// phantom record for its terminal arrival; drop it when the matched
/// passage is the final one.
fn is_loop_artifact(visit: &StopVisit, selected_stop: &str) -> bool {
    let (Some(first), Some(last)) = (visit.stop_times.first(), visit.stop_times.last()) else {
        return false;
    };
    visit.stop_times.len() > 1
        && first.stop_id == selected_stop
        && last.stop_id == selected_stop
        && visit.scheduled_departure == last.departure
}

/// Build the unified departure feed for one selected stop:
/// filter stale and malformed records, dedup by trip id keeping the
/// first-seen, and sort ascending by effective departure time.
/// The sort is stable, so repeated input yields identical output.
pub fn build_departures(
    visits: Vec<StopVisit>,
    selected_stop: &str,
    now: DateTime<Utc>,
) -> Vec<Departure> {
    let mut seen = HashSet::new();
    let mut departures: Vec<Departure> = visits
        .into_iter()
        .filter(|v| !is_gone(v, selected_stop, now))
        .filter(|v| !is_loop_artifact(v, selected_stop))
        .filter(|v| seen.insert(v.trip_id.clone()))
        .map(|v| {
            let away = stops_away(selected_stop, &v.stop_times, v.delay, now);
            let effective = v.effective_departure();

            // Arrival imminent: report "here" even if index arithmetic lags.
            let proximate = (effective - now).num_minutes() <= PROXIMITY_MIN;
            let away = if proximate && away.is_some() {
                Some(0)
            } else {
                away
            };

            Departure {
                id: v.trip_id,
                route: v.route,
                color: v.color,
                company: v.company,
                destination: v.destination,
                departure_time: effective,
                delay: v.delay,
                stops_away: away,
                started: v.started,
                departing: away == Some(0),
            }
        })
        .collect();

    departures.sort_by_key(|d| d.departure_time);
    departures
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, h, m, 0).unwrap()
    }

    fn visit(trip_id: &str, scheduled: DateTime<Utc>, delay: Option<i32>) -> StopVisit {
        StopVisit {
            trip_id: trip_id.into(),
            route: "5".into(),
            color: None,
            company: Some("tt".into()),
            destination: "Povo".into(),
            scheduled_departure: scheduled,
            delay,
            stop_next: Some("other".into()),
            started: true,
            stop_times: vec![
                StopTimeEntry {
                    stop_id: "a".into(),
                    departure: scheduled - Duration::minutes(10),
                },
                StopTimeEntry {
                    stop_id: "sel".into(),
                    departure: scheduled,
                },
                StopTimeEntry {
                    stop_id: "z".into(),
                    departure: scheduled + Duration::minutes(10),
                },
            ],
        }
    }

    #[test]
    fn past_departure_with_vehicle_gone_is_dropped() {
        // Scheduled 2 minutes ago, no delay, next stop is elsewhere.
        let v = visit("t1", at(10, 0), Some(0));
        let out = build_departures(vec![v], "sel", at(10, 2));
        assert!(out.is_empty());
    }

    #[test]
    fn past_schedule_with_delay_still_in_future_is_kept() {
        // Scheduled 2 minutes ago but running 5 late: effective 10:03.
        let v = visit("t1", at(10, 0), Some(5));
        let out = build_departures(vec![v], "sel", at(10, 2));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].departure_time, at(10, 5));
    }

    #[test]
    fn vehicle_still_approaching_selected_stop_is_kept() {
        // Past the tolerance but the provider says our stop is next.
        let mut v = visit("t1", at(10, 0), Some(0));
        v.stop_next = Some("sel".into());
        let out = build_departures(vec![v], "sel", at(10, 5));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn terminal_loop_passage_is_dropped() {
        let scheduled = at(11, 0);
        let mut v = visit("ring", scheduled, None);
        v.stop_times = vec![
            StopTimeEntry {
                stop_id: "sel".into(),
                departure: at(10, 30),
            },
            StopTimeEntry {
                stop_id: "mid".into(),
                departure: at(10, 45),
            },
            StopTimeEntry {
                stop_id: "sel".into(),
                departure: scheduled,
            },
        ];
        let out = build_departures(vec![v], "sel", at(10, 0));
        assert!(out.is_empty());
    }

    #[test]
    fn duplicate_trip_ids_keep_first_seen() {
        let mut a = visit("t1", at(10, 10), Some(0));
        a.route = "from-first-feed".into();
        let mut b = visit("t1", at(10, 10), Some(3));
        b.route = "from-second-feed".into();

        let out = build_departures(vec![a, b], "sel", at(10, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].route, "from-first-feed");
    }

    #[test]
    fn output_is_sorted_by_effective_time_and_deterministic() {
        let inputs = vec![
            visit("late", at(10, 10), Some(10)), // effective 10:20
            visit("early", at(10, 12), Some(0)), // effective 10:12
            visit("tie-a", at(10, 15), None),
            visit("tie-b", at(10, 15), None),
        ];

        let first = build_departures(inputs.clone(), "sel", at(10, 0));
        let second = build_departures(inputs, "sel", at(10, 0));
        assert_eq!(first, second);

        let ids: Vec<&str> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn stops_away_counts_from_last_passed_stop() {
        let times = vec![
            StopTimeEntry {
                stop_id: "a".into(),
                departure: at(9, 50),
            },
            StopTimeEntry {
                stop_id: "b".into(),
                departure: at(9, 55),
            },
            StopTimeEntry {
                stop_id: "sel".into(),
                departure: at(10, 10),
            },
        ];

        // 10:00: passed "a" and "b", two... one stop between b and sel.
        assert_eq!(stops_away("sel", &times, Some(0), at(10, 0)), Some(1));
        // Nothing passed yet at 09:00.
        assert_eq!(stops_away("sel", &times, Some(0), at(9, 0)), Some(3));
        // Delay shifts the adjusted times: at 10:00 with +10 only "a" passed.
        assert_eq!(stops_away("sel", &times, Some(10), at(10, 0)), Some(2));
        // Past the selected stop: clamped to zero, never negative.
        assert_eq!(stops_away("sel", &times, Some(0), at(10, 30)), Some(0));
        // Unknown stop.
        assert_eq!(stops_away("nope", &times, None, at(10, 0)), None);
    }

    #[test]
    fn imminent_arrival_reports_zero_stops_away() {
        let v = visit("t1", at(10, 1), Some(0));
        let out = build_departures(vec![v], "sel", at(10, 0));
        assert_eq!(out[0].stops_away, Some(0));
        assert!(out[0].departing);
    }
}
