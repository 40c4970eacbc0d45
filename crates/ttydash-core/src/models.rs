use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Status of one tube/DLR/Overground line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TubeLineStatus {
    pub line_name: String,
    pub status_severity: String,
    /// Route segments, e.g. `"Poplar ↔ Tower Gateway"`.
    pub affected_routes: Vec<String>,
    pub description: String,
}

/// Status of one station (closures, step-free access issues, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    pub station_name: String,
    pub status_severity: String,
    pub affected_routes: Vec<String>,
    pub description: String,
}

/// One row of a live departure board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainDeparture {
    pub scheduled_time: String,
    pub expected_time: String,
    /// `"On time"`, `"Delayed"`, or the raw board text.
    pub status: String,
    pub destination: String,
    /// Three-letter CRS code, empty when the board omits it.
    pub destination_code: String,
    pub calling_at: String,
    pub platform: String,
    pub duration: String,
    pub stops: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_reason: Option<String>,
    pub is_delayed: bool,
}

/// A pub returned by the Wetherspoon pub finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoonsPub {
    pub name: String,
    pub distance: String,
    pub address: String,
    pub open_status: String,
    pub closing_time: String,
    pub facilities: Vec<String>,
    pub pub_url: String,
    pub menu_url: String,
}

/// The records held by a panel, tagged by source shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum Records {
    TubeLines(Vec<TubeLineStatus>),
    Stations(Vec<StationStatus>),
    Departures(Vec<TrainDeparture>),
    Pubs(Vec<SpoonsPub>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::TubeLines(r) => r.len(),
            Records::Stations(r) => r.len(),
            Records::Departures(r) => r.len(),
            Records::Pubs(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Records::TubeLines(_) => "tube_lines",
            Records::Stations(_) => "stations",
            Records::Departures(_) => "departures",
            Records::Pubs(_) => "pubs",
        }
    }

    /// SHA-256 of the serialized records, used for change detection.
    pub fn data_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        compute_hash(&json)
    }
}

/// Record types that can be wrapped into [`Records`].
pub trait PanelRecord: Sized {
    fn into_records(records: Vec<Self>) -> Records;
}

impl PanelRecord for TubeLineStatus {
    fn into_records(records: Vec<Self>) -> Records {
        Records::TubeLines(records)
    }
}

impl PanelRecord for StationStatus {
    fn into_records(records: Vec<Self>) -> Records {
        Records::Stations(records)
    }
}

impl PanelRecord for TrainDeparture {
    fn into_records(records: Vec<Self>) -> Records {
        Records::Departures(records)
    }
}

impl PanelRecord for SpoonsPub {
    fn into_records(records: Vec<Self>) -> Records {
        Records::Pubs(records)
    }
}

/// A successful poll result: the records plus when they were retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub retrieved_at: DateTime<Utc>,
    pub records: Records,
}

impl Payload {
    pub fn new(records: Records) -> Self {
        Self {
            retrieved_at: Utc::now(),
            records,
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
