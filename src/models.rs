/// Canonical trip model shared by every provider adapter.
///
/// Field names and nullability are a wire contract: the UI and the SSE
/// stream deserialize these shapes as-is. `delay` uses signed minutes
/// (positive = late, negative = early, zero = on time, null = unknown);
/// `current_stop_index == -1` is the only "not departed" sentinel.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
}

impl TripStatus {
    /// A terminal trip no longer produces updates; polling sessions stop here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Regular,
    NotPlanned,
    Canceled,
}

/// One scheduled halt within a trip.
///
/// `actual_*` fields are only set once the corresponding event has been
/// observed upstream; their absence means "not yet happened", never
/// "unknown placeholder".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub scheduled_arrival: Option<DateTime<Utc>>,
    pub scheduled_departure: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub arrival_delay: Option<i32>,
    pub departure_delay: Option<i32>,
    pub scheduled_platform: Option<String>,
    pub actual_platform: Option<String>,
    pub status: StopStatus,
}

/// Advisory text attached to a trip or route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Drop alerts repeating an already-seen message, keeping the first.
pub fn dedup_alerts(alerts: Vec<Alert>) -> Vec<Alert> {
    let mut seen = std::collections::HashSet::new();
    alerts
        .into_iter()
        .filter(|a| seen.insert(a.message.clone()))
        .collect()
}

/// A single vehicle's scheduled + realtime journey, rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub status: TripStatus,
    pub delay: Option<i32>,
    /// Index of the stop the vehicle last reached; -1 before departure.
    pub current_stop_index: i32,
    pub last_known_location: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub number: String,
    pub company: Option<String>,
    pub color: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    /// Ordered by traversal: origin first, destination last.
    pub stops: Vec<Stop>,
    pub info: Vec<Alert>,
}

impl Trip {
    /// Fingerprint of the realtime-relevant fields, used by polling
    /// sessions to suppress pushes when nothing changed.
    pub fn fingerprint(&self) -> u64 {
        let payload = serde_json::to_vec(self).unwrap_or_default();
        seahash::hash(&payload)
    }
}

/// A single upcoming bus arrival at a rider-selected stop.
///
/// `departure_time` is always the effective (delay-adjusted) instant,
/// never the raw schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    pub id: String,
    pub route: String,
    pub color: Option<String>,
    pub company: Option<String>,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub delay: Option<i32>,
    pub stops_away: Option<u32>,
    pub started: bool,
    pub departing: bool,
}

/// Realtime enrichment attached to an itinerary leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegRealTime {
    pub delay: Option<i32>,
    pub tracked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: TripStatus,
    pub info: Vec<Alert>,
}

impl Default for LegRealTime {
    fn default() -> Self {
        LegRealTime {
            delay: None,
            tracked: false,
            url: None,
            status: TripStatus::Scheduled,
            info: Vec::new(),
        }
    }
}

/// Endpoint of an itinerary leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub departure: Option<DateTime<Utc>>,
    pub scheduled_departure: Option<DateTime<Utc>>,
    pub arrival: Option<DateTime<Utc>>,
    pub scheduled_arrival: Option<DateTime<Utc>>,
}

/// One mode-homogeneous segment of a multi-modal itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub mode: String,
    pub from: Place,
    pub to: Place,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub duration: i64,
    pub trip_id: Option<String>,
    pub trip_short_name: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_color: Option<String>,
    pub agency_name: Option<String>,
    pub headsign: Option<String>,
    /// Set when the planner itself reported realtime data for this leg.
    pub realtime: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_time: Option<LegRealTime>,
}

impl Leg {
    pub fn is_walk(&self) -> bool {
        self.mode == "WALK"
    }
}

/// A planned multi-modal route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes, recomputed after realtime enrichment.
    pub duration: i64,
    pub transfers: u32,
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Directions {
    pub trips: Vec<Itinerary>,
    pub direct: Vec<Itinerary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_cursor: Option<String>,
}
