/// Conversion of provider timestamp encodings into canonical UTC instants.
///
/// Three encodings show up across the upstream feeds:
/// - epoch milliseconds (Viaggiatreno)
/// - bare `HH:MM[:SS]` clock strings anchored to a base date (Italo,
///   Trentino Trasporti stop times)
/// - wrapped epoch strings like `/Date(1699999999000+0100)/` (Cicero)
///
/// Clock strings that sort before a supplied `previous` anchor roll
/// forward one day; every adapter chaining sequential stop times relies
/// on this for trips crossing midnight.
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

/// Italo reports "01:00" for fields it has no data for.
const NO_DATA_SENTINEL: &str = "01:00";

lazy_static! {
    static ref WRAPPED_DATE: Regex = Regex::new(r"/Date\((-?\d+)(?:[+-]\d{4})?\)/").unwrap();
}

/// Canonical instant from epoch milliseconds.
///
/// Converting an instant that is already canonical is the identity,
/// modulo sub-millisecond precision.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Canonical instant from a `/Date(ms+ZZZZ)/` wrapped string.
pub fn from_wrapped(raw: &str) -> Option<DateTime<Utc>> {
    let caps = WRAPPED_DATE.captures(raw)?;
    let millis: i64 = caps.get(1)?.as_str().parse().ok()?;
    from_epoch_millis(millis)
}

/// Canonical instant from a `HH:MM[:SS]` clock string.
///
/// The clock time is placed on `base`'s date (or on `previous`'s date
/// when an anchor is supplied, so a trip already on "day 2" stays
/// there). If the result still sorts before `previous`, it rolls
/// forward one day. Returns `None` for the provider's no-data sentinel
/// and for unparseable input.
pub fn from_clock_time(
    raw: &str,
    base: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NO_DATA_SENTINEL {
        return None;
    }

    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()?;

    let anchor = previous.unwrap_or(base);
    let mut instant = anchor.date_naive().and_time(time).and_utc();

    if let Some(prev) = previous {
        if instant < prev {
            instant += Duration::days(1);
        }
    }

    Some(instant)
}

/// Delay classification shared by UI coloring and reconciliation
/// tie-breaks. `None` is always Neutral; unknown must never collapse
/// into "on time".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DelaySeverity {
    Neutral,
    Ahead,
    OnTime,
    Minor,
    Moderate,
    Severe,
}

pub fn delay_severity(delay: Option<i32>) -> DelaySeverity {
    match delay {
        None => DelaySeverity::Neutral,
        Some(d) if d < 0 => DelaySeverity::Ahead,
        Some(0) => DelaySeverity::OnTime,
        Some(d) if d < 5 => DelaySeverity::Minor,
        Some(d) if d < 10 => DelaySeverity::Moderate,
        Some(_) => DelaySeverity::Severe,
    }
}

/// Scheduled time plus currently known delay, in minutes.
pub fn effective_time(scheduled: DateTime<Utc>, delay: Option<i32>) -> DateTime<Utc> {
    scheduled + Duration::minutes(delay.unwrap_or(0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, 12, 0, 0).unwrap()
    }

    #[test]
    fn epoch_millis_roundtrip_is_identity() {
        let instant = base();
        let converted = from_epoch_millis(instant.timestamp_millis()).unwrap();
        assert_eq!(converted, instant);
        // converting the converted value again changes nothing
        assert_eq!(
            from_epoch_millis(converted.timestamp_millis()).unwrap(),
            converted
        );
    }

    #[test]
    fn wrapped_date_parses_with_and_without_offset() {
        let instant = from_wrapped("/Date(1715601600000+0100)/").unwrap();
        assert_eq!(instant.timestamp_millis(), 1_715_601_600_000);

        let bare = from_wrapped("/Date(1715601600000)/").unwrap();
        assert_eq!(bare, instant);

        assert!(from_wrapped("Date(nope)").is_none());
    }

    #[test]
    fn no_data_sentinel_yields_none_not_midnight() {
        assert_eq!(from_clock_time("01:00", base(), None), None);
        assert_eq!(from_clock_time("", base(), None), None);
    }

    #[test]
    fn clock_time_anchors_to_base_date() {
        let instant = from_clock_time("14:35", base(), None).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 13, 14, 35, 0).unwrap());

        let with_secs = from_clock_time("14:35:20", base(), None).unwrap();
        assert_eq!(
            with_secs,
            Utc.with_ymd_and_hms(2024, 5, 13, 14, 35, 20).unwrap()
        );
    }

    #[test]
    fn clock_time_rolls_forward_past_midnight() {
        let previous = Utc.with_ymd_and_hms(2024, 5, 13, 23, 58, 0).unwrap();
        let instant = from_clock_time("01:30", base(), Some(previous)).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 14, 1, 30, 0).unwrap());
    }

    #[test]
    fn clock_time_stays_on_previous_date_when_later() {
        // Already on day 2: a later time must not jump to day 3.
        let previous = Utc.with_ymd_and_hms(2024, 5, 14, 1, 30, 0).unwrap();
        let instant = from_clock_time("02:10", base(), Some(previous)).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 14, 2, 10, 0).unwrap());
    }

    #[test]
    fn severity_tiers_match_contract() {
        assert_eq!(delay_severity(None), DelaySeverity::Neutral);
        assert_eq!(delay_severity(Some(-2)), DelaySeverity::Ahead);
        assert_eq!(delay_severity(Some(0)), DelaySeverity::OnTime);
        assert_eq!(delay_severity(Some(4)), DelaySeverity::Minor);
        assert_eq!(delay_severity(Some(5)), DelaySeverity::Moderate);
        assert_eq!(delay_severity(Some(9)), DelaySeverity::Moderate);
        assert_eq!(delay_severity(Some(10)), DelaySeverity::Severe);
    }

    #[test]
    fn effective_time_applies_delay_minutes() {
        let scheduled = base();
        assert_eq!(effective_time(scheduled, None), scheduled);
        assert_eq!(
            effective_time(scheduled, Some(5)),
            scheduled + Duration::minutes(5)
        );
        assert_eq!(
            effective_time(scheduled, Some(-2)),
            scheduled - Duration::minutes(2)
        );
    }
}
