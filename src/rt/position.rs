/// Fractional progress of a vehicle along its ordered stop list.
///
/// Pure: no animation state lives here. The presentation layer owns
/// interpolation cadence and simply re-evaluates this on its own clock.
use crate::models::{Stop, StopStatus};
use crate::rt::time::effective_time;
use chrono::{DateTime, Utc};

/// Fraction never reaches the next integer; a vehicle "almost there"
/// stays visually before the stop until an arrival event is observed.
const MAX_FRACTION: f64 = 0.99;

/// Estimate where the vehicle is along the trip's stops.
///
/// `current_stop_index` is the provider's index into the *unfiltered*
/// stop array (-1 = not departed); canceled stops are excluded from the
/// computation and the index is re-mapped onto the filtered sequence,
/// snapping to the nearest non-canceled stop when the provider flag
/// points at a canceled one.
///
/// Returns a value in `[-1, active_len - 1]`:
/// - `-1.0` before departure
/// - an exact integer while dwelling at a stop
/// - `i + f` with `f in (0, 0.99]` while running between stops `i` and `i+1`
pub fn progress_index(
    stops: &[Stop],
    delay: Option<i32>,
    current_stop_index: i32,
    now: DateTime<Utc>,
) -> f64 {
    let active: Vec<&Stop> = stops
        .iter()
        .filter(|s| s.status != StopStatus::Canceled)
        .collect();

    if active.is_empty() {
        return -1.0;
    }
    let last = active.len() - 1;

    let current = remap_index(stops, current_stop_index);

    if current.is_none() {
        // Not yet departed, as long as the clock agrees.
        if let Some(first_dep) = active[0].scheduled_departure {
            if now < effective_time(first_dep, delay) {
                return -1.0;
            }
        } else {
            return -1.0;
        }
    }

    // Terminal arrival observed: the trip is done regardless of telemetry lag.
    if active[last].actual_arrival.is_some() {
        return last as f64;
    }

    if let Some(idx) = current {
        let stop = active[idx];

        // Arrived but not departed: the vehicle is dwelling exactly here.
        if stop.actual_arrival.is_some() && stop.actual_departure.is_none() {
            return idx as f64;
        }

        match stop.actual_departure {
            Some(departed) if idx < last => {
                if let Some(next_arrival) = active[idx + 1].scheduled_arrival {
                    let eta = effective_time(next_arrival, delay);
                    if now >= departed && now <= eta {
                        return idx as f64 + segment_fraction(departed, eta, now);
                    }
                }
                // Window missed (stale telemetry): fall through to the scan.
            }
            Some(_) => return idx as f64,
            None => return idx as f64,
        }
    }

    // No usable current-stop anchor: scan departure events against the clock.
    let mut last_passed: Option<usize> = None;
    for i in 0..last {
        let Some(next_scheduled) = active[i + 1].scheduled_arrival else {
            continue;
        };
        if active[i].scheduled_departure.is_none() {
            continue;
        }

        let Some(departed) = active[i].actual_departure else {
            if Some(i) == current {
                return i as f64;
            }
            continue;
        };

        let eta = effective_time(next_scheduled, delay);
        if now >= departed {
            last_passed = Some(i);
        }
        if now >= departed && now <= eta {
            return i as f64 + segment_fraction(departed, eta, now);
        }
    }

    match last_passed {
        Some(i) => i as f64 + MAX_FRACTION,
        None => current.map(|c| c as f64).unwrap_or(0.0).max(0.0),
    }
}

/// Linear interpolation between departure and delay-adjusted next
/// arrival, capped below 1.0. A train running early (negative delay)
/// can shrink the window to nothing; the cap keeps it from overshooting
/// the boundary stop.
fn segment_fraction(departed: DateTime<Utc>, eta: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let total = (eta - departed).num_seconds() as f64;
    if total <= 0.0 {
        return MAX_FRACTION;
    }
    let elapsed = (now - departed).num_seconds() as f64;
    (elapsed / total).clamp(0.0, MAX_FRACTION)
}

/// Map a provider index on the raw stop array onto the canceled-filtered
/// sequence. A flag pointing at a canceled stop snaps forward to the
/// next non-canceled stop, or backward when none follows.
fn remap_index(stops: &[Stop], current_stop_index: i32) -> Option<usize> {
    if current_stop_index < 0 {
        return None;
    }
    let idx = current_stop_index as usize;
    if idx >= stops.len() {
        return None;
    }

    let target = if stops[idx].status != StopStatus::Canceled {
        idx
    } else {
        (idx + 1..stops.len())
            .find(|&i| stops[i].status != StopStatus::Canceled)
            .or_else(|| (0..idx).rev().find(|&i| stops[i].status != StopStatus::Canceled))?
    };

    // Position of `target` within the filtered sequence.
    Some(
        stops[..target]
            .iter()
            .filter(|s| s.status != StopStatus::Canceled)
            .count(),
    )
}
