/// MOTIS journey-planner client: itinerary planning and stop discovery.
///
/// The planner's wire shapes are close to the canonical model but carry
/// durations in seconds and optional fields the canonical contract pins
/// down, so responses go through an explicit conversion step.
use crate::models::{Itinerary, Leg, Place};
use crate::providers::{ProviderClient, ProviderError};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const NUM_ITINERARIES: u32 = 5;
const MAX_TRANSIT_WALK_SECS: u32 = 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotisPlace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotisLeg {
    pub mode: String,
    pub from: MotisPlace,
    pub to: MotisPlace,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end_time: Option<DateTime<Utc>>,
    /// Seconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub trip_short_name: Option<String>,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub headsign: Option<String>,
    #[serde(default)]
    pub real_time: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotisItinerary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub transfers: u32,
    #[serde(default)]
    pub legs: Vec<MotisLeg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotisPlanResponse {
    #[serde(default)]
    pub itineraries: Vec<MotisItinerary>,
    #[serde(default)]
    pub direct: Vec<MotisItinerary>,
    #[serde(default)]
    pub page_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotisStop {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
}

fn convert_place(raw: MotisPlace) -> Place {
    Place {
        name: raw.name,
        lat: raw.lat,
        lon: raw.lon,
        departure: raw.departure,
        scheduled_departure: raw.scheduled_departure,
        arrival: raw.arrival,
        scheduled_arrival: raw.scheduled_arrival,
    }
}

fn convert_leg(raw: MotisLeg) -> Leg {
    let scheduled_start = raw.scheduled_start_time.unwrap_or(raw.start_time);
    let scheduled_end = raw.scheduled_end_time.unwrap_or(raw.end_time);
    Leg {
        mode: raw.mode,
        from: convert_place(raw.from),
        to: convert_place(raw.to),
        start_time: raw.start_time,
        end_time: raw.end_time,
        scheduled_start_time: scheduled_start,
        scheduled_end_time: scheduled_end,
        duration: raw.duration / 60,
        trip_id: raw.trip_id,
        trip_short_name: raw.trip_short_name.filter(|s| !s.is_empty()),
        route_short_name: raw.route_short_name,
        route_long_name: raw.route_long_name,
        route_color: raw.route_color,
        agency_name: raw.agency_name,
        headsign: raw.headsign,
        realtime: raw.real_time,
        real_time: None,
    }
}

pub fn convert_itinerary(raw: MotisItinerary) -> Itinerary {
    Itinerary {
        start_time: raw.start_time,
        end_time: raw.end_time,
        duration: raw.duration / 60,
        transfers: raw.transfers,
        legs: raw.legs.into_iter().map(convert_leg).collect(),
    }
}

pub struct MotisClient {
    http: ProviderClient,
    base_url: String,
}

impl MotisClient {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderClient::new()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn plan(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        time: &str,
    ) -> Result<MotisPlanResponse, ProviderError> {
        let url = format!(
            "{}/api/v5/plan?fromPlace={},{}&toPlace={},{}&time={}&numItineraries={}&maxPreTransitTime={}&maxPostTransitTime={}&maxDirectTime={}&algorithm=RAPTOR",
            self.base_url,
            from.0,
            from.1,
            to.0,
            to.1,
            urlencoding::encode(time),
            NUM_ITINERARIES,
            MAX_TRANSIT_WALK_SECS,
            MAX_TRANSIT_WALK_SECS,
            MAX_TRANSIT_WALK_SECS,
        );
        self.http.get_json(&url).await
    }

    /// Stops inside a bounding box, for the nearby-departures fan-out.
    pub async fn stops_in_area(
        &self,
        min: (f64, f64),
        max: (f64, f64),
    ) -> Result<Vec<MotisStop>, ProviderError> {
        let url = format!(
            "{}/api/v1/map/stops?min={},{}&max={},{}",
            self.base_url, min.0, min.1, max.0, max.1
        );
        self.http.get_json(&url).await
    }
}
