/// Static station directory: canonical station ID <-> display name.
///
/// Provider feeds spell the same station several ways ("VERONA P.N.",
/// "Verona Porta Nuova", "verona porta-nuova"), so every match goes
/// through [`normalize_station_name`] first.
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

lazy_static! {
    static ref ABBREV_CENTRALE: Regex = Regex::new(r"(?i)\bc\.\s*le\b").unwrap();
    static ref ABBREV_SAN: Regex = Regex::new(r"(?i)\bs\.\s*").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StationDirectoryError {
    #[error("failed to read station directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse station directory: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fold accented characters to their bare letter; provider feeds mix
/// accented and plain spellings of the same name.
fn strip_accents(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'À' | 'Á' | 'Â' | 'Ä' => 'a',
            'È' | 'É' | 'Ê' | 'Ë' => 'e',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
            'Ò' | 'Ó' | 'Ô' | 'Ö' => 'o',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
            _ => c,
        })
        .collect()
}

/// Canonical matching key for a station display name: lowercase,
/// accents stripped, "C.le"/"S." abbreviations expanded, hyphens and
/// runs of whitespace collapsed to single spaces.
pub fn normalize_station_name(name: &str) -> String {
    let lowered = strip_accents(name).to_lowercase();
    let expanded = ABBREV_CENTRALE.replace_all(&lowered, "centrale");
    let expanded = ABBREV_SAN.replace_all(&expanded, "san ");
    let no_hyphens = expanded.replace('-', " ");
    MULTI_SPACE.replace_all(no_hyphens.trim(), " ").to_string()
}

pub struct StationDirectory {
    records: Vec<StationRecord>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl StationDirectory {
    pub fn from_records(records: Vec<StationRecord>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            by_id.insert(record.id.clone(), index);
            // First spelling wins for ambiguous normalized names.
            by_name
                .entry(normalize_station_name(&record.name))
                .or_insert(index);
        }
        Self {
            records,
            by_id,
            by_name,
        }
    }

    pub fn load(path: &Path) -> Result<Self, StationDirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<StationRecord> = serde_json::from_str(&raw)?;
        tracing::info!(count = records.len(), path = %path.display(), "loaded station directory");
        Ok(Self::from_records(records))
    }

    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    pub fn get(&self, id: &str) -> Option<&StationRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.get(id).map(|r| r.name.as_str())
    }

    /// Match a provider-spelled display name against the directory.
    pub fn find_by_name(&self, raw_name: &str) -> Option<&StationRecord> {
        self.by_name
            .get(&normalize_station_name(raw_name))
            .map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StationDirectory {
        StationDirectory::from_records(vec![
            StationRecord {
                id: "S02430".into(),
                name: "Verona Porta Nuova".into(),
                lat: Some(45.428),
                lon: Some(10.982),
            },
            StationRecord {
                id: "S01700".into(),
                name: "Milano Centrale".into(),
                lat: None,
                lon: None,
            },
            StationRecord {
                id: "S02593".into(),
                name: "San Candido".into(),
                lat: None,
                lon: None,
            },
        ])
    }

    #[test]
    fn normalization_expands_abbreviations() {
        assert_eq!(normalize_station_name("Milano C.le"), "milano centrale");
        assert_eq!(normalize_station_name("S. Candido"), "san candido");
        assert_eq!(normalize_station_name("S.Candido"), "san candido");
    }

    #[test]
    fn normalization_strips_accents_and_hyphens() {
        assert_eq!(normalize_station_name("Alà dei Sardi"), "ala dei sardi");
        assert_eq!(
            normalize_station_name("Verona  Porta-Nuova"),
            "verona porta nuova"
        );
    }

    #[test]
    fn lookup_tolerates_provider_spellings() {
        let dir = directory();
        assert_eq!(
            dir.find_by_name("VERONA PORTA NUOVA").map(|r| r.id.as_str()),
            Some("S02430")
        );
        assert_eq!(
            dir.find_by_name("Milano C.le").map(|r| r.id.as_str()),
            Some("S01700")
        );
        assert_eq!(
            dir.find_by_name("s. candido").map(|r| r.id.as_str()),
            Some("S02593")
        );
        assert!(dir.find_by_name("Stazione Inesistente").is_none());
    }

    #[test]
    fn reverse_lookup_returns_display_name() {
        let dir = directory();
        assert_eq!(dir.name_for("S02430"), Some("Verona Porta Nuova"));
        assert_eq!(dir.name_for("S99999"), None);
    }
}
