/// Italo (RicercaTrenoService) adapter.
///
/// The feed reports every time as a bare `HH:MM` clock string and uses
/// `"01:00"` as its no-data placeholder. Stops come split into
/// `StazioniFerme` (already served) and `StazioniNonFerme` (ahead);
/// scheduled instants are chained so overnight runs keep monotonic
/// order across midnight.
use crate::models::{Stop, StopStatus, Trip, TripStatus};
use crate::providers::{ProviderClient, ProviderError};
use crate::stations::StationDirectory;
use crate::rt::time::from_clock_time;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const COMPANY: &str = "italo";
const BRAND_COLOR: &str = "CA2A31";

#[derive(Debug, Clone, Deserialize)]
pub struct ItaloResponse {
    #[serde(rename = "IsEmpty", default)]
    pub is_empty: bool,
    #[serde(rename = "LastUpdate", default)]
    pub last_update: Option<String>,
    #[serde(rename = "TrainSchedule")]
    pub train_schedule: Option<ItaloSchedule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItaloSchedule {
    #[serde(rename = "TrainNumber", default)]
    pub train_number: String,
    #[serde(rename = "DepartureDate", default)]
    pub departure_date: String,
    #[serde(rename = "ArrivalDate", default)]
    pub arrival_date: String,
    #[serde(rename = "DepartureStationDescription", default)]
    pub departure_station: String,
    #[serde(rename = "ArrivalStationDescription", default)]
    pub arrival_station: String,
    #[serde(rename = "Distruption")]
    pub disruption: Option<ItaloDisruption>,
    #[serde(rename = "StazionePartenza")]
    pub origin_station: Option<ItaloStation>,
    #[serde(rename = "StazioniFerme", default)]
    pub served_stations: Vec<ItaloStation>,
    #[serde(rename = "StazioniNonFerme", default)]
    pub upcoming_stations: Vec<ItaloStation>,
    #[serde(rename = "Leg")]
    pub leg: Option<ItaloLeg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItaloDisruption {
    #[serde(rename = "DelayAmount", default)]
    pub delay_amount: i32,
    #[serde(rename = "LocationCode", default)]
    pub location_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItaloStation {
    #[serde(rename = "RfiLocationCode", default)]
    pub rfi_location_code: String,
    #[serde(rename = "LocationDescription", default)]
    pub location_description: String,
    #[serde(rename = "EstimatedArrivalTime", default)]
    pub estimated_arrival_time: String,
    #[serde(rename = "EstimatedDepartureTime", default)]
    pub estimated_departure_time: String,
    #[serde(rename = "ActualArrivalTime", default)]
    pub actual_arrival_time: String,
    #[serde(rename = "ActualDepartureTime", default)]
    pub actual_departure_time: String,
    #[serde(rename = "ActualArrivalPlatform", default)]
    pub actual_arrival_platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItaloLeg {
    #[serde(rename = "ArrivalStationDescription", default)]
    pub arrival_station: String,
}

fn capitalize_words(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn minutes_between(later: Option<DateTime<Utc>>, earlier: Option<DateTime<Utc>>) -> Option<i32> {
    match (later, earlier) {
        (Some(a), Some(b)) => Some((a - b).num_minutes() as i32),
        _ => None,
    }
}

pub struct ItaloClient {
    http: ProviderClient,
    base_url: String,
}

impl ItaloClient {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderClient::new()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_trip(&self, number: &str, stations: &StationDirectory) -> Option<Trip> {
        let url = format!("{}/?TrainNumber={}", self.base_url, urlencoding::encode(number));
        let raw: ItaloResponse = match self.http.get_json(&url).await {
            Ok(r) => r,
            Err(ProviderError::NotFound) => return None,
            Err(e) => {
                tracing::warn!(train = number, error = %e, "italo trip fetch failed");
                return None;
            }
        };
        assemble_trip(raw, stations, Utc::now())
    }
}

/// Normalize the raw schedule. `None` when the feed marks the response
/// empty (unknown train number or no run today).
pub fn assemble_trip(
    raw: ItaloResponse,
    stations: &StationDirectory,
    now: DateTime<Utc>,
) -> Option<Trip> {
    if raw.is_empty {
        return None;
    }
    let schedule = raw.train_schedule?;
    let delay = schedule
        .disruption
        .as_ref()
        .map(|d| d.delay_amount)
        .unwrap_or(0);

    let mut stops: Vec<Stop> = Vec::new();
    let mut last_departure: Option<DateTime<Utc>> = None;

    if let Some(origin) = &schedule.origin_station {
        let scheduled_departure = from_clock_time(&schedule.departure_date, now, None);
        let actual_departure = from_clock_time(&origin.actual_departure_time, now, None);
        last_departure = actual_departure.or(scheduled_departure);

        stops.push(Stop {
            id: origin.rfi_location_code.clone(),
            name: capitalize_words(&schedule.departure_station),
            scheduled_arrival: None,
            scheduled_departure,
            actual_arrival: None,
            actual_departure,
            arrival_delay: None,
            departure_delay: minutes_between(actual_departure, scheduled_departure),
            scheduled_platform: None,
            actual_platform: origin.actual_arrival_platform.clone(),
            status: StopStatus::Regular,
        });
    }

    let served_count = schedule.served_stations.len();
    for station in &schedule.served_stations {
        let scheduled_arrival = from_clock_time(&station.estimated_arrival_time, now, None);
        let scheduled_departure = from_clock_time(&station.estimated_departure_time, now, None);
        let actual_arrival = from_clock_time(&station.actual_arrival_time, now, None);
        let actual_departure = from_clock_time(&station.actual_departure_time, now, None);
        last_departure = actual_departure.or(scheduled_departure).or(last_departure);

        stops.push(Stop {
            id: station.rfi_location_code.clone(),
            name: capitalize_words(&station.location_description),
            scheduled_arrival,
            scheduled_departure,
            actual_arrival,
            actual_departure,
            arrival_delay: minutes_between(actual_arrival, scheduled_arrival),
            departure_delay: minutes_between(actual_departure, scheduled_departure),
            scheduled_platform: None,
            actual_platform: station.actual_arrival_platform.clone(),
            status: StopStatus::Regular,
        });
    }

    for station in &schedule.upcoming_stations {
        let scheduled_arrival =
            from_clock_time(&station.estimated_arrival_time, now, last_departure);
        let scheduled_departure = from_clock_time(
            &station.estimated_departure_time,
            now,
            scheduled_arrival.or(last_departure),
        );
        last_departure = scheduled_departure.or(last_departure);

        stops.push(Stop {
            id: station.rfi_location_code.clone(),
            name: capitalize_words(&station.location_description),
            scheduled_arrival,
            scheduled_departure,
            actual_arrival: None,
            actual_departure: None,
            arrival_delay: Some(delay),
            departure_delay: Some(delay),
            scheduled_platform: None,
            actual_platform: station.actual_arrival_platform.clone(),
            status: StopStatus::Regular,
        });
    }

    // Index of the stop the train last reached: the leg's arrival
    // station is where it is headed, so current is one before it.
    let current_stop_index = schedule
        .leg
        .as_ref()
        .and_then(|leg| {
            let target = capitalize_words(&leg.arrival_station);
            stops.iter().position(|s| s.name == target)
        })
        .and_then(|i| i.checked_sub(1))
        .map(|i| i as i32)
        .unwrap_or(served_count as i32);

    let departed = stops
        .first()
        .map(|s| s.actual_departure.is_some())
        .unwrap_or(false)
        || served_count > 0;
    let arrived = stops
        .last()
        .map(|s| s.actual_arrival.is_some())
        .unwrap_or(false);

    let status = if arrived {
        TripStatus::Completed
    } else if departed {
        TripStatus::Active
    } else {
        TripStatus::Scheduled
    };

    let last_known_location = schedule
        .disruption
        .as_ref()
        .and_then(|d| d.location_code.as_deref())
        .and_then(|code| stations.name_for(code))
        .map(String::from)
        .or_else(|| stops.first().map(|s| s.name.clone()));

    let last_update = raw
        .last_update
        .as_deref()
        .and_then(|s| from_clock_time(s, now, None));

    Some(Trip {
        status,
        delay: Some(delay),
        current_stop_index: if departed { current_stop_index } else { -1 },
        last_known_location,
        last_update,
        category: Some("AV".to_string()),
        number: schedule.train_number.clone(),
        company: Some(COMPANY.to_string()),
        color: Some(BRAND_COLOR.to_string()),
        origin: capitalize_words(&schedule.departure_station),
        destination: capitalize_words(&schedule.arrival_station),
        departure_time: stops.first().and_then(|s| s.scheduled_departure),
        arrival_time: from_clock_time(&schedule.arrival_date, now, last_departure),
        stops,
        info: Vec::new(),
    })
}
