/// Cicero (MyCicero OTP proxy) adapter, used for ATV Verona runs.
///
/// The proxy speaks a JSON dialect where every instant is a wrapped
/// `/Date(ms+0100)/` epoch string and the current stop is flagged with
/// `FermataCorrente` instead of an index.
use crate::models::{Stop, StopStatus, Trip, TripStatus};
use crate::providers::{ProviderClient, ProviderError};
use crate::rt::time::from_wrapped;
use chrono::Utc;
use serde::{Deserialize, Serialize};

const DEFAULT_COLOR: &str = "2C7FFF";
const CLIENT_HEADER: &str = "tpwebportal;5.4.1";

#[derive(Debug, Serialize)]
struct TripRequest {
    #[serde(rename = "CodiceAzienda")]
    agency: String,
    #[serde(rename = "Giorno")]
    day: String,
    #[serde(rename = "IdCorsa")]
    run_id: String,
    #[serde(rename = "IdSistema")]
    system: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroEnvelope {
    #[serde(rename = "Oggetto")]
    pub payload: Option<CiceroTrip>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroTrip {
    #[serde(rename = "Fermate", default)]
    pub stops: Vec<CiceroStop>,
    #[serde(rename = "Ritardo", default)]
    pub delay: Option<String>,
    #[serde(rename = "StazioneUltimoRilevamento", default)]
    pub last_detection_station: Option<String>,
    #[serde(rename = "Linea")]
    pub line: Option<CiceroLine>,
    #[serde(rename = "Corsa")]
    pub run: Option<CiceroRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroStop {
    #[serde(rename = "FermataCorrente", default)]
    pub current: bool,
    #[serde(rename = "Orario", default)]
    pub arrival: String,
    #[serde(rename = "OrarioPartenza", default)]
    pub departure: String,
    #[serde(rename = "Localita")]
    pub place: Option<CiceroPlace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroPlace {
    #[serde(rename = "Id", default)]
    pub id: serde_json::Value,
    #[serde(rename = "Descrizione", default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroLine {
    #[serde(rename = "Extraurbano", default)]
    pub suburban: bool,
    #[serde(rename = "Colore", default)]
    pub color: Option<String>,
    #[serde(rename = "CodiceInfoUtenza", default)]
    pub public_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroRun {
    #[serde(rename = "DataOraPartenza", default)]
    pub departure: String,
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

/// `Ritardo` is a stringly-typed field: empty string means unknown.
fn parse_delay(raw: Option<&str>) -> Option<i32> {
    raw.map(str::trim).filter(|s| !s.is_empty())?.parse().ok()
}

pub struct CiceroClient {
    http: ProviderClient,
    base_url: String,
    agency: String,
}

impl CiceroClient {
    pub fn new(base_url: &str, agency: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderClient::new()?.header("Client", CLIENT_HEADER),
            base_url: base_url.trim_end_matches('/').to_string(),
            agency: agency.to_string(),
        })
    }

    pub async fn fetch_trip(&self, id: &str) -> Option<Trip> {
        let now = Utc::now();
        let day = format!("/Date({}+0100)/", now.timestamp_millis());
        let request = TripRequest {
            agency: self.agency.clone(),
            day,
            run_id: format!("{}#1:{}", self.agency, id),
            system: "OTP_NE".to_string(),
        };

        let url = format!("{}?url=momoservice/json/GetFermateCorsa2", self.base_url);
        let envelope: CiceroEnvelope = match self.http.post_json(&url, &request).await {
            Ok(e) => e,
            Err(ProviderError::NotFound) => return None,
            Err(e) => {
                tracing::warn!(run = id, error = %e, "cicero trip fetch failed");
                return None;
            }
        };

        envelope.payload.and_then(assemble_trip)
    }
}

pub fn assemble_trip(raw: CiceroTrip) -> Option<Trip> {
    if raw.stops.is_empty() {
        return None;
    }

    let delay = parse_delay(raw.delay.as_deref());
    let current_stop_index = raw
        .stops
        .iter()
        .position(|s| s.current)
        .map(|i| i as i32)
        .unwrap_or(-1);

    let stops: Vec<Stop> = raw
        .stops
        .iter()
        .map(|stop| {
            let place = stop.place.as_ref();
            Stop {
                id: place
                    .map(|p| p.id.to_string().trim_matches('"').to_string())
                    .unwrap_or_default(),
                name: place
                    .map(|p| capitalize_words(&p.description))
                    .unwrap_or_default(),
                scheduled_arrival: from_wrapped(&stop.arrival),
                scheduled_departure: from_wrapped(&stop.departure),
                actual_arrival: None,
                actual_departure: None,
                arrival_delay: delay,
                departure_delay: delay,
                scheduled_platform: None,
                actual_platform: None,
                status: StopStatus::Regular,
            }
        })
        .collect();

    let last = stops.len() as i32 - 1;
    let status = if current_stop_index < 0 {
        TripStatus::Scheduled
    } else if current_stop_index >= last {
        TripStatus::Completed
    } else {
        TripStatus::Active
    };

    let last_known_location = raw
        .last_detection_station
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(capitalize_words)
        .or_else(|| {
            (current_stop_index >= 0)
                .then(|| stops.get(current_stop_index as usize).map(|s| s.name.clone()))
                .flatten()
        });

    let last_update = (current_stop_index >= 0)
        .then(|| {
            stops
                .get(current_stop_index as usize)
                .and_then(|s| s.scheduled_arrival)
                .map(|t| t + chrono::Duration::minutes(delay.unwrap_or(0) as i64))
        })
        .flatten();

    let line = raw.line.as_ref();
    Some(Trip {
        status,
        delay,
        current_stop_index,
        last_known_location,
        last_update,
        category: Some(if line.map(|l| l.suburban).unwrap_or(false) {
            "E".to_string()
        } else {
            "U".to_string()
        }),
        number: line
            .and_then(|l| l.public_code.clone())
            .unwrap_or_default(),
        company: Some("atv".to_string()),
        color: Some(
            line.and_then(|l| l.color.clone())
                .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        ),
        origin: stops.first().map(|s| s.name.clone()).unwrap_or_default(),
        destination: stops.last().map(|s| s.name.clone()).unwrap_or_default(),
        departure_time: raw
            .run
            .as_ref()
            .and_then(|r| from_wrapped(&r.departure))
            .or_else(|| stops.first().and_then(|s| s.scheduled_departure)),
        arrival_time: stops.last().and_then(|s| s.scheduled_arrival),
        stops,
        info: Vec::new(),
    })
}
