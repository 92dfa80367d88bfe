/// Trenitalia / RFI (Viaggiatreno) adapter.
///
/// Trip lookup is a two-call dance: the autocomplete endpoint maps a
/// train number to one or more (origin station, run date) candidates,
/// then `andamentoTreno` returns the full run for a candidate. The same
/// number can appear twice on one day (a completed morning run and a
/// running evening one); the still-running candidate wins.
use crate::models::{Alert, Stop, StopStatus, Trip, TripStatus};
use crate::providers::{ProviderClient, ProviderError};
use crate::rt::reconcile::reconcile_delay;
use crate::rt::time::from_epoch_millis;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

const COMPANY: &str = "trenitalia";

/// Window in which a just-departed stop's departure delay supersedes
/// its (stale) arrival delay.
const DEPARTING_NOW_WINDOW_SECS: i64 = 60;

lazy_static! {
    static ref SHORT_CATEGORIES: HashMap<&'static str, &'static str> = HashMap::from([
        ("regionale", "R"),
        ("regionale veloce", "RV"),
        ("regio express", "RE"),
        ("frecciarossa", "FR"),
        ("frecciabianca", "FB"),
        ("frecciargento", "FA"),
        ("eurocity", "EC"),
        ("railjet", "RJ"),
        ("intercity", "IC"),
        ("italo", "AV"),
        ("intercity notte", "ICN"),
        ("malpensa express", "MXP"),
        ("metropolitano", "M"),
        ("espresso", "E"),
        ("eurostar italia", "ES*"),
        ("autocorsa", "bus"),
        ("treno storico", "TS"),
        ("interregionale", "iR"),
    ]);
}

/// Compact display code for a full category description.
pub fn short_category(category: &str) -> Option<String> {
    let lowered = category.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    if lowered.starts_with("suburbano") {
        return lowered.split_whitespace().nth(1).map(str::to_uppercase);
    }
    if lowered.starts_with("servizio ferroviario metropolitano") {
        return Some(
            lowered
                .replace("servizio ferroviario metropolitano linea", "SFM")
                .trim()
                .to_string(),
        );
    }
    Some(
        SHORT_CATEGORIES
            .get(lowered.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| category.trim().to_uppercase()),
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct VtStop {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub stazione: String,
    #[serde(rename = "arrivo_teorico", default)]
    pub scheduled_arrival_millis: Option<i64>,
    #[serde(rename = "partenza_teorica", default)]
    pub scheduled_departure_millis: Option<i64>,
    #[serde(rename = "arrivoReale", default)]
    pub actual_arrival_millis: Option<i64>,
    #[serde(rename = "partenzaReale", default)]
    pub actual_departure_millis: Option<i64>,
    #[serde(rename = "ritardoArrivo", default)]
    pub arrival_delay: Option<i32>,
    #[serde(rename = "ritardoPartenza", default)]
    pub departure_delay: Option<i32>,
    #[serde(rename = "binarioProgrammatoPartenzaDescrizione", default)]
    pub scheduled_platform: Option<String>,
    #[serde(rename = "binarioEffettivoPartenzaDescrizione", default)]
    pub actual_platform: Option<String>,
    #[serde(rename = "actualFermataType", default)]
    pub fermata_type: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VtTrainStatus {
    #[serde(default)]
    pub fermate: Vec<VtStop>,
    #[serde(rename = "tipoTreno", default)]
    pub train_type: Option<String>,
    #[serde(default)]
    pub provvedimento: i32,
    #[serde(rename = "oraUltimoRilevamento", default)]
    pub last_detection_millis: Option<i64>,
    #[serde(rename = "stazioneUltimoRilevamento", default)]
    pub last_detection_station: Option<String>,
    #[serde(default)]
    pub ritardo: Option<i32>,
    #[serde(rename = "nonPartito", default)]
    pub not_departed: bool,
    #[serde(default)]
    pub circolante: bool,
    #[serde(default)]
    pub origine: Option<String>,
    #[serde(default)]
    pub destinazione: Option<String>,
    #[serde(rename = "numeroTreno", default)]
    pub train_number: Option<i64>,
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    #[serde(rename = "orarioPartenza", default)]
    pub departure_millis: Option<i64>,
    #[serde(rename = "orarioArrivo", default)]
    pub arrival_millis: Option<i64>,
    #[serde(rename = "subTitle", default)]
    pub subtitle: Option<String>,
}

/// One row of the `partenze` station board.
#[derive(Debug, Clone, Deserialize)]
pub struct VtBoardRow {
    #[serde(rename = "numeroTreno", default)]
    pub train_number: i64,
    #[serde(rename = "categoriaDescrizione", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub ritardo: Option<i32>,
    #[serde(default)]
    pub destinazione: Option<String>,
    #[serde(rename = "orarioPartenza", default)]
    pub departure_millis: Option<i64>,
    #[serde(rename = "binarioProgrammatoPartenzaDescrizione", default)]
    pub scheduled_platform: Option<String>,
    #[serde(rename = "binarioEffettivoPartenzaDescrizione", default)]
    pub actual_platform: Option<String>,
    #[serde(default)]
    pub circolante: bool,
    #[serde(rename = "nonPartitoAncora", default)]
    pub not_departed: bool,
}

/// Normalized station-board entry served by the board endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardTrain {
    pub number: String,
    pub category: Option<String>,
    pub short_category: Option<String>,
    pub destination: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub delay: Option<i32>,
    pub platform: Option<String>,
    pub departed: bool,
}

impl From<VtBoardRow> for BoardTrain {
    fn from(row: VtBoardRow) -> Self {
        BoardTrain {
            number: row.train_number.to_string(),
            short_category: row.category.as_deref().and_then(short_category),
            category: row.category,
            destination: row.destinazione,
            departure_time: row.departure_millis.and_then(from_epoch_millis),
            // A board row for a train without telemetry shows no delay
            // figure rather than a misleading zero.
            delay: if row.circolante { row.ritardo } else { None },
            platform: row.actual_platform.or(row.scheduled_platform),
            departed: !row.not_departed && row.circolante,
        }
    }
}

/// Candidate run parsed from the autocomplete endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TripCandidate {
    pub origin_id: String,
    pub midnight_millis: i64,
}

/// Autocomplete rows look like
/// `2468 - VERONA PORTA NUOVA|2468-S02430-1715551200000`.
pub fn parse_candidates(body: &str) -> Vec<TripCandidate> {
    body.lines()
        .filter_map(|line| {
            let key = line.split('|').nth(1)?;
            let mut parts = key.split('-');
            let _number = parts.next()?;
            let origin_id = parts.next()?.trim();
            let midnight_millis: i64 = parts.next()?.trim().parse().ok()?;
            if origin_id.is_empty() {
                return None;
            }
            Some(TripCandidate {
                origin_id: origin_id.to_string(),
                midnight_millis,
            })
        })
        .collect()
}

fn stop_status(fermata_type: i32) -> StopStatus {
    match fermata_type {
        3 => StopStatus::Canceled,
        2 => StopStatus::NotPlanned,
        _ => StopStatus::Regular,
    }
}

fn trip_status(raw: &VtTrainStatus, stops: &[Stop]) -> TripStatus {
    if raw.provvedimento == 1 || raw.train_type.as_deref() == Some("ST") {
        return TripStatus::Canceled;
    }
    if raw.not_departed {
        return TripStatus::Scheduled;
    }
    let arrived = stops
        .iter()
        .rev()
        .find(|s| s.status != StopStatus::Canceled)
        .map(|s| s.actual_arrival.is_some())
        .unwrap_or(false);
    if arrived {
        TripStatus::Completed
    } else {
        TripStatus::Active
    }
}

/// Last stop with an observed event. A stop that has arrived but not
/// departed is the current one; its index is not advanced.
fn current_stop_index(stops: &[Stop]) -> i32 {
    stops
        .iter()
        .rposition(|s| s.actual_arrival.is_some() || s.actual_departure.is_some())
        .map(|i| i as i32)
        .unwrap_or(-1)
}

/// Trip-level delay with per-stop refinements: a mid-dwell stop's
/// arrival delay is fresher than the trip figure, and a stop departing
/// right now reports its departure delay instead of a stale arrival
/// one.
fn select_delay(raw: &VtTrainStatus, stops: &[Stop], current: i32, now: DateTime<Utc>) -> Option<i32> {
    let tracked = raw.last_detection_millis.is_some() || raw.circolante;
    let mut delay = if tracked { raw.ritardo } else { None };

    if let Some(stop) = (current >= 0).then(|| stops.get(current as usize)).flatten() {
        if stop.actual_arrival.is_some() && stop.actual_departure.is_none() {
            if let Some(d) = stop.arrival_delay {
                delay = Some(d);
            }
        } else if let Some(departed) = stop.actual_departure {
            if (now - departed).num_seconds().abs() <= DEPARTING_NOW_WINDOW_SECS {
                if let Some(d) = stop.departure_delay {
                    delay = Some(d);
                }
            }
        }
    }
    delay
}

pub fn assemble_trip(raw: VtTrainStatus, now: DateTime<Utc>) -> Trip {
    let stops: Vec<Stop> = raw
        .fermate
        .iter()
        .map(|f| Stop {
            id: f.id.clone().unwrap_or_default(),
            name: f.stazione.clone(),
            scheduled_arrival: f.scheduled_arrival_millis.and_then(from_epoch_millis),
            scheduled_departure: f.scheduled_departure_millis.and_then(from_epoch_millis),
            actual_arrival: f.actual_arrival_millis.and_then(from_epoch_millis),
            actual_departure: f.actual_departure_millis.and_then(from_epoch_millis),
            arrival_delay: f.arrival_delay,
            departure_delay: f.departure_delay,
            scheduled_platform: f.scheduled_platform.clone(),
            actual_platform: f.actual_platform.clone(),
            status: stop_status(f.fermata_type),
        })
        .collect();

    let status = trip_status(&raw, &stops);
    let current = if raw.not_departed {
        -1
    } else {
        current_stop_index(&stops)
    };
    let delay = select_delay(&raw, &stops, current, now);

    let info: Vec<Alert> = raw
        .subtitle
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|message| {
            vec![Alert {
                message: message.to_string(),
                url: None,
                date: None,
                source: Some("RFI".to_string()),
            }]
        })
        .unwrap_or_default();

    let last_known_location = raw
        .last_detection_station
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "--")
        .map(String::from);

    Trip {
        status,
        delay,
        current_stop_index: current,
        last_known_location,
        last_update: raw.last_detection_millis.and_then(from_epoch_millis),
        category: raw.category.as_deref().and_then(short_category),
        number: raw
            .train_number
            .map(|n| n.to_string())
            .unwrap_or_default(),
        company: Some(COMPANY.to_string()),
        color: None,
        origin: raw.origine.clone().unwrap_or_default(),
        destination: raw.destinazione.clone().unwrap_or_default(),
        departure_time: raw.departure_millis.and_then(from_epoch_millis),
        arrival_time: raw.arrival_millis.and_then(from_epoch_millis),
        stops,
        info,
    }
}

/// Adopt a station-board delay figure for the same train number when it
/// reports the train as more late than telemetry does.
pub fn corroborate_delay(trip: &mut Trip, board: &[VtBoardRow]) {
    let Ok(number) = trip.number.parse::<i64>() else {
        return;
    };
    if let Some(row) = board.iter().find(|r| r.train_number == number) {
        let secondary = if row.circolante { row.ritardo } else { None };
        trip.delay = reconcile_delay(trip.delay, secondary);
    }
}

pub struct ViaggiatrenoClient {
    http: ProviderClient,
    base_url: String,
}

impl ViaggiatrenoClient {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderClient::new()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a train number to its canonical trip.
    pub async fn fetch_trip(&self, number: &str) -> Option<Trip> {
        let url = format!(
            "{}/cercaNumeroTrenoTrenoAutocomplete/{}",
            self.base_url,
            urlencoding::encode(number)
        );
        let body = match self.http.get_text(&url).await {
            Ok(b) => b,
            Err(ProviderError::NotFound) => return None,
            Err(e) => {
                tracing::warn!(train = number, error = %e, "viaggiatreno candidate lookup failed");
                return None;
            }
        };

        let candidates = parse_candidates(&body);
        let mut first: Option<Trip> = None;
        for candidate in &candidates {
            match self.fetch_candidate(number, candidate).await {
                Some(trip) if trip.status != TripStatus::Completed => return Some(trip),
                Some(trip) => first.get_or_insert(trip),
                None => continue,
            };
        }
        first
    }

    async fn fetch_candidate(&self, number: &str, candidate: &TripCandidate) -> Option<Trip> {
        let url = format!(
            "{}/andamentoTreno/{}/{}/{}",
            self.base_url, candidate.origin_id, number, candidate.midnight_millis
        );
        let raw: VtTrainStatus = match self.http.get_json(&url).await {
            Ok(r) => r,
            Err(ProviderError::NotFound) => return None,
            Err(e) => {
                tracing::warn!(train = number, origin = %candidate.origin_id, error = %e, "viaggiatreno trip fetch failed");
                return None;
            }
        };
        Some(assemble_trip(raw, Utc::now()))
    }

    /// Departure board for a station, used both as the board endpoint
    /// and as the corroborating delay source.
    pub async fn fetch_board(&self, station_id: &str) -> Vec<VtBoardRow> {
        let now = Utc::now();
        let url = format!(
            "{}/partenze/{}/{}",
            self.base_url,
            urlencoding::encode(station_id),
            urlencoding::encode(&now.format("%a %b %d %Y %H:%M:%S GMT+0000").to_string()),
        );
        match self.http.get_json(&url).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(station = station_id, error = %e, "viaggiatreno board fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, 10, 30, 0).unwrap()
    }

    fn millis(h: u32, m: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 5, 13, h, m, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn fixture() -> VtTrainStatus {
        serde_json::from_str(&format!(
            r#"{{
                "numeroTreno": 2468,
                "categoria": "Regionale Veloce",
                "tipoTreno": "PG",
                "provvedimento": 0,
                "nonPartito": false,
                "circolante": true,
                "ritardo": 5,
                "oraUltimoRilevamento": {},
                "stazioneUltimoRilevamento": "ROVERETO",
                "origine": "VERONA PORTA NUOVA",
                "destinazione": "BOLZANO",
                "orarioPartenza": {},
                "orarioArrivo": {},
                "subTitle": "",
                "fermate": [
                    {{
                        "id": "S02430", "stazione": "VERONA PORTA NUOVA",
                        "partenza_teorica": {}, "partenzaReale": {},
                        "ritardoPartenza": 2, "actualFermataType": 1,
                        "binarioProgrammatoPartenzaDescrizione": "4"
                    }},
                    {{
                        "id": "S02462", "stazione": "ROVERETO",
                        "arrivo_teorico": {}, "partenza_teorica": {},
                        "arrivoReale": {}, "ritardoArrivo": 3,
                        "actualFermataType": 1
                    }},
                    {{
                        "id": "S02458", "stazione": "TRENTO",
                        "arrivo_teorico": {}, "actualFermataType": 0
                    }}
                ]
            }}"#,
            millis(10, 28),
            millis(9, 40),
            millis(11, 30),
            millis(9, 40),
            millis(9, 42),
            millis(10, 25),
            millis(10, 27),
            millis(10, 28),
            millis(10, 50),
        ))
        .unwrap()
    }

    #[test]
    fn candidates_parse_autocomplete_rows() {
        let body = "2468 - VERONA PORTA NUOVA|2468-S02430-1715551200000\n2468 - TORINO P.N.|2468-S00219-1715551200000\n";
        let candidates = parse_candidates(body);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].origin_id, "S02430");
        assert_eq!(candidates[0].midnight_millis, 1_715_551_200_000);
        assert_eq!(candidates[1].origin_id, "S00219");

        assert!(parse_candidates("garbage without separator\n").is_empty());
    }

    #[test]
    fn mid_dwell_stop_is_current_and_lends_its_arrival_delay() {
        // Arrived in Rovereto at 10:28, not yet departed.
        let trip = assemble_trip(fixture(), now());
        assert_eq!(trip.current_stop_index, 1);
        assert_eq!(trip.status, TripStatus::Active);
        // Mid-dwell arrival delay (3) beats the trip-level figure (5).
        assert_eq!(trip.delay, Some(3));
        assert_eq!(trip.last_known_location.as_deref(), Some("ROVERETO"));
        assert_eq!(trip.category.as_deref(), Some("RV"));
    }

    #[test]
    fn departing_now_prefers_departure_delay() {
        let mut raw = fixture();
        // Departed Rovereto 30 seconds before "now".
        raw.fermate[1].actual_departure_millis =
            Some(now().timestamp_millis() - 30_000);
        raw.fermate[1].departure_delay = Some(7);

        let trip = assemble_trip(raw, now());
        assert_eq!(trip.delay, Some(7));
    }

    #[test]
    fn stale_departure_falls_back_to_trip_delay() {
        let mut raw = fixture();
        // Departed Rovereto 10 minutes ago: outside the window.
        raw.fermate[1].actual_departure_millis =
            Some(now().timestamp_millis() - 600_000);
        raw.fermate[1].departure_delay = Some(7);

        let trip = assemble_trip(raw, now());
        assert_eq!(trip.delay, Some(5));
    }

    #[test]
    fn canceled_run_is_flagged_regardless_of_telemetry() {
        let mut raw = fixture();
        raw.train_type = Some("ST".to_string());
        assert_eq!(assemble_trip(raw, now()).status, TripStatus::Canceled);

        let mut raw = fixture();
        raw.provvedimento = 1;
        assert_eq!(assemble_trip(raw, now()).status, TripStatus::Canceled);
    }

    #[test]
    fn not_departed_run_has_sentinel_index() {
        let mut raw = fixture();
        raw.not_departed = true;
        raw.circolante = false;
        raw.last_detection_millis = None;
        for f in &mut raw.fermate {
            f.actual_arrival_millis = None;
            f.actual_departure_millis = None;
        }
        let trip = assemble_trip(raw, now());
        assert_eq!(trip.current_stop_index, -1);
        assert_eq!(trip.status, TripStatus::Scheduled);
        assert_eq!(trip.delay, None);
    }

    #[test]
    fn terminal_arrival_marks_completed_skipping_canceled_tail() {
        let mut raw = fixture();
        raw.fermate[1].actual_departure_millis = Some(millis(10, 29));
        raw.fermate[2].fermata_type = 3; // final stop canceled
        raw.fermate[1].actual_arrival_millis = Some(millis(10, 28));
        // Last non-canceled stop (Rovereto) has arrived.
        let trip = assemble_trip(raw, now());
        assert_eq!(trip.status, TripStatus::Completed);
        assert_eq!(trip.stops[2].status, StopStatus::Canceled);
    }

    #[test]
    fn board_figure_only_raises_the_delay() {
        let board: Vec<VtBoardRow> = serde_json::from_str(
            r#"[{"numeroTreno": 2468, "ritardo": 9, "circolante": true},
                {"numeroTreno": 100, "ritardo": 20, "circolante": true}]"#,
        )
        .unwrap();

        let mut trip = assemble_trip(fixture(), now());
        trip.delay = Some(5);
        corroborate_delay(&mut trip, &board);
        assert_eq!(trip.delay, Some(9));

        // Board claiming less late than telemetry is ignored.
        trip.delay = Some(12);
        corroborate_delay(&mut trip, &board);
        assert_eq!(trip.delay, Some(12));
    }

    #[test]
    fn board_rows_normalize_for_display() {
        let row: VtBoardRow = serde_json::from_str(&format!(
            r#"{{"numeroTreno": 2468, "categoriaDescrizione": "Regionale Veloce",
                "ritardo": 5, "destinazione": "BOLZANO", "orarioPartenza": {},
                "binarioProgrammatoPartenzaDescrizione": "4",
                "binarioEffettivoPartenzaDescrizione": "6",
                "circolante": true, "nonPartitoAncora": false}}"#,
            millis(9, 40),
        ))
        .unwrap();

        let train = BoardTrain::from(row);
        assert_eq!(train.number, "2468");
        assert_eq!(train.short_category.as_deref(), Some("RV"));
        assert_eq!(train.platform.as_deref(), Some("6"));
        assert_eq!(train.delay, Some(5));
        assert!(train.departed);
    }

    #[test]
    fn suburban_and_sfm_categories_shorten_heuristically() {
        assert_eq!(short_category("Regionale").as_deref(), Some("R"));
        assert_eq!(short_category("suburbano s2").as_deref(), Some("S2"));
        assert_eq!(
            short_category("servizio ferroviario metropolitano linea 3").as_deref(),
            Some("SFM 3")
        );
        assert_eq!(short_category(""), None);
    }
}
