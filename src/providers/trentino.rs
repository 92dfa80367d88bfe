/// Trentino Trasporti (gtlservice) adapter.
///
/// The feed authenticates with basic auth and reports progress as
/// `lastSequenceDetection`: the number of stops the vehicle has already
/// served. Stop times are bare `HH:MM:SS` clock strings; they are
/// chained through [`from_clock_time`] so runs crossing midnight keep
/// monotonic instants.
use crate::cache::TtlCache;
use crate::models::{dedup_alerts, Alert, LegRealTime, Stop, StopStatus, Trip, TripStatus};
use crate::providers::{ProviderClient, ProviderError};
use crate::rt::departures::{StopTimeEntry, StopVisit};
use crate::rt::time::from_clock_time;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const COMPANY: &str = "trentino-trasporti";
const UNKNOWN_STOP_NAME: &str = "Fermata sconosciuta";
const REFERENCE_DATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);
// One entry per feed type ("U"/"E"); anything past that is a bug guard.
const REFERENCE_CACHE_CAPACITY: usize = 8;
const DEPARTURES_LIMIT: u32 = 15;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtStop {
    pub stop_id: i64,
    #[serde(default)]
    pub stop_name: String,
    #[serde(default)]
    pub stop_lat: Option<f64>,
    #[serde(default)]
    pub stop_lon: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtRouteNews {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtRoute {
    pub route_id: i64,
    #[serde(default)]
    pub route_short_name: String,
    #[serde(default)]
    pub route_long_name: String,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub news: Option<Vec<TtRouteNews>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtStopTime {
    pub stop_id: i64,
    #[serde(default)]
    pub arrival_time: String,
    #[serde(default)]
    pub departure_time: String,
    #[serde(default)]
    pub stop_sequence: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtTrip {
    pub trip_id: String,
    #[serde(default)]
    pub route_id: i64,
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub last_sequence_detection: Option<u32>,
    #[serde(default)]
    pub last_event_recived_at: Option<String>,
    #[serde(default)]
    pub stop_last: Option<i64>,
    #[serde(default)]
    pub stop_next: Option<i64>,
    #[serde(default)]
    pub trip_headsign: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub stop_times: Vec<TtStopTime>,
}

impl TtTrip {
    pub fn delay_minutes(&self) -> Option<i32> {
        self.delay.map(|d| d.round() as i32)
    }

    /// Live telemetry has been received for this run.
    pub fn started(&self) -> bool {
        self.last_event_recived_at.is_some()
    }
}

/// A nearby stop to query departures for, already resolved to this
/// provider's id space.
#[derive(Debug, Clone)]
pub struct NearbyStop {
    pub id: i64,
    /// "U" urban or "E" suburban.
    pub kind: String,
}

pub struct TrentinoClient {
    http: ProviderClient,
    base_url: String,
    stops_cache: TtlCache<String, Arc<Vec<TtStop>>>,
    routes_cache: TtlCache<String, Arc<Vec<TtRoute>>>,
}

impl TrentinoClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, ProviderError> {
        let http = ProviderClient::with_basic_auth(username, password)?
            .header("Accept", "application/json")
            .header("X-Requested-With", "it.tndigit.mit");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            stops_cache: TtlCache::new(REFERENCE_DATA_TTL, REFERENCE_CACHE_CAPACITY),
            routes_cache: TtlCache::new(REFERENCE_DATA_TTL, REFERENCE_CACHE_CAPACITY),
        })
    }

    async fn stops(&self, kind: &str) -> Result<Arc<Vec<TtStop>>, ProviderError> {
        let key = kind.to_string();
        if let Some(cached) = self.stops_cache.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/stops?type={}", self.base_url, kind);
        let stops: Arc<Vec<TtStop>> = Arc::new(self.http.get_json(&url).await?);
        self.stops_cache.insert(key, stops.clone()).await;
        Ok(stops)
    }

    async fn routes(&self, kind: &str) -> Result<Arc<Vec<TtRoute>>, ProviderError> {
        let key = kind.to_string();
        if let Some(cached) = self.routes_cache.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/routes?type={}", self.base_url, kind);
        let routes: Arc<Vec<TtRoute>> = Arc::new(self.http.get_json(&url).await?);
        self.routes_cache.insert(key, routes.clone()).await;
        Ok(routes)
    }

    /// Fetch one trip and normalize it. `None` covers upstream 404s and
    /// exhausted retries alike.
    pub async fn fetch_trip(&self, id: &str) -> Option<Trip> {
        let url = format!("{}/trips/{}", self.base_url, id);
        let raw: TtTrip = match self.http.get_json(&url).await {
            Ok(t) => t,
            Err(ProviderError::NotFound) => return None,
            Err(e) => {
                tracing::warn!(trip_id = id, error = %e, "trentino trip fetch failed");
                return None;
            }
        };

        let stop_names = self.stop_names(&raw.kind).await;
        let route = self.route_details(&raw.kind, raw.route_id).await;
        Some(assemble_trip(raw, &stop_names, route.as_ref(), Utc::now()))
    }

    /// Realtime enrichment for an itinerary leg riding this provider.
    pub async fn leg_realtime(&self, trip_id: &str) -> LegRealTime {
        match self.fetch_trip(trip_id).await {
            Some(trip) => LegRealTime {
                tracked: trip.delay.is_some(),
                delay: trip.delay,
                url: Some(format!("/track/{}/{}", COMPANY, trip_id)),
                status: trip.status,
                info: trip.info,
            },
            None => LegRealTime::default(),
        }
    }

    /// Upcoming departures for a set of nearby stops, fanned out
    /// concurrently. A failing stop contributes nothing; it never fails
    /// the batch.
    pub async fn departures(&self, stops: &[NearbyStop]) -> Vec<StopVisit> {
        let now = Utc::now();
        let fetches = stops.iter().map(|stop| self.stop_departures(stop, now));
        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn stop_departures(&self, stop: &NearbyStop, now: DateTime<Utc>) -> Vec<StopVisit> {
        let url = format!(
            "{}/trips_new?type={}&stopId={}&limit={}&refDateTime={}",
            self.base_url,
            stop.kind,
            stop.id,
            DEPARTURES_LIMIT,
            urlencoding::encode(&now.to_rfc3339()),
        );

        let trips: Vec<TtTrip> = match self.http.get_json(&url).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(stop_id = stop.id, error = %e, "trentino departures fetch failed");
                return Vec::new();
            }
        };

        let routes = self.routes(&stop.kind).await.ok();
        trips
            .into_iter()
            .filter_map(|trip| {
                let route = routes
                    .as_ref()
                    .and_then(|rs| rs.iter().find(|r| r.route_id == trip.route_id));
                visit_from_trip(trip, stop.id, route, now)
            })
            .collect()
    }

    async fn stop_names(&self, kind: &str) -> HashMap<i64, String> {
        match self.stops(kind).await {
            Ok(stops) => stops
                .iter()
                .map(|s| (s.stop_id, s.stop_name.clone()))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "trentino stop registry unavailable");
                HashMap::new()
            }
        }
    }

    async fn route_details(&self, kind: &str, route_id: i64) -> Option<TtRoute> {
        self.routes(kind)
            .await
            .ok()?
            .iter()
            .find(|r| r.route_id == route_id)
            .cloned()
    }
}

/// Route advisories still in effect.
pub fn active_route_alerts(route: &TtRoute, now: DateTime<Utc>) -> Vec<Alert> {
    let alerts = route
        .news
        .iter()
        .flatten()
        .filter(|n| n.end_date.map(|end| end > now).unwrap_or(true))
        .map(|n| Alert {
            message: n.details.clone(),
            url: n.url.clone(),
            date: None,
            source: Some(
                n.service_type
                    .clone()
                    .unwrap_or_else(|| "Trentino Trasporti".to_string()),
            ),
        })
        .collect();
    dedup_alerts(alerts)
}

/// Build the canonical trip from the raw feed record.
///
/// `lastSequenceDetection == n` means the first `n` stops are behind the
/// vehicle, so stops before that index get their scheduled times echoed
/// as actuals (the feed reports no per-stop event times).
pub fn assemble_trip(
    raw: TtTrip,
    stop_names: &HashMap<i64, String>,
    route: Option<&TtRoute>,
    now: DateTime<Utc>,
) -> Trip {
    let detected = raw.last_sequence_detection.unwrap_or(0) as usize;
    let started = raw.started();
    let delay = raw.delay_minutes();

    let status = if !raw.stop_times.is_empty() && detected >= raw.stop_times.len() {
        TripStatus::Completed
    } else if started {
        TripStatus::Active
    } else {
        TripStatus::Scheduled
    };

    let mut previous: Option<DateTime<Utc>> = None;
    let stops: Vec<Stop> = raw
        .stop_times
        .iter()
        .enumerate()
        .map(|(index, st)| {
            let scheduled_arrival = from_clock_time(&st.arrival_time, now, previous);
            previous = scheduled_arrival.or(previous);
            let scheduled_departure = from_clock_time(&st.departure_time, now, previous);
            previous = scheduled_departure.or(previous);

            let passed = index < detected;
            Stop {
                id: st.stop_id.to_string(),
                name: stop_names
                    .get(&st.stop_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_STOP_NAME.to_string()),
                scheduled_arrival,
                scheduled_departure,
                actual_arrival: passed.then_some(scheduled_arrival).flatten(),
                actual_departure: passed.then_some(scheduled_departure).flatten(),
                arrival_delay: passed.then_some(delay).flatten(),
                departure_delay: passed.then_some(delay).flatten(),
                scheduled_platform: None,
                actual_platform: None,
                status: StopStatus::Regular,
            }
        })
        .collect();

    let current_stop_index = if !started {
        -1
    } else {
        (detected as i32 - 1).max(0)
    };

    let last_known_location = raw
        .stop_last
        .and_then(|id| stop_names.get(&id).cloned())
        .or_else(|| {
            (current_stop_index >= 0)
                .then(|| stops.get(current_stop_index as usize).map(|s| s.name.clone()))
                .flatten()
        });

    let last_update = raw
        .last_event_recived_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    let info = route
        .map(|r| active_route_alerts(r, now))
        .unwrap_or_default();

    Trip {
        status,
        delay,
        current_stop_index,
        last_known_location,
        last_update,
        category: Some(raw.kind.clone()),
        number: route
            .map(|r| r.route_short_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| raw.trip_id.clone()),
        company: Some(COMPANY.to_string()),
        color: route.and_then(|r| r.route_color.clone()),
        origin: stops.first().map(|s| s.name.clone()).unwrap_or_default(),
        destination: if raw.trip_headsign.is_empty() {
            stops.last().map(|s| s.name.clone()).unwrap_or_default()
        } else {
            raw.trip_headsign.clone()
        },
        departure_time: stops.first().and_then(|s| s.scheduled_departure),
        arrival_time: stops.last().and_then(|s| s.scheduled_arrival),
        stops,
        info,
    }
}

/// Departure-feed record for one trip at the queried stop.
fn visit_from_trip(
    raw: TtTrip,
    stop_id: i64,
    route: Option<&TtRoute>,
    now: DateTime<Utc>,
) -> Option<StopVisit> {
    let mut previous: Option<DateTime<Utc>> = None;
    let stop_times: Vec<StopTimeEntry> = raw
        .stop_times
        .iter()
        .filter_map(|st| {
            let departure = from_clock_time(&st.departure_time, now, previous)?;
            previous = Some(departure);
            Some(StopTimeEntry {
                stop_id: st.stop_id.to_string(),
                departure,
            })
        })
        .collect();

    let scheduled_departure = raw
        .stop_times
        .iter()
        .position(|st| st.stop_id == stop_id)
        .and_then(|i| stop_times.get(i))
        .map(|entry| entry.departure)?;

    Some(StopVisit {
        trip_id: raw.trip_id.clone(),
        route: route
            .map(|r| r.route_short_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| raw.trip_id.clone()),
        color: route.and_then(|r| r.route_color.clone()),
        company: Some(COMPANY.to_string()),
        destination: raw.trip_headsign.clone(),
        scheduled_departure,
        delay: raw.delay_minutes(),
        stop_next: raw.stop_next.map(|id| id.to_string()),
        started: raw.started(),
        stop_times,
    })
}
