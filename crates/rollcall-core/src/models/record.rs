use std::fmt;

use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Arrival,
    Departure,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Arrival => "arrival",
            RecordType::Departure => "departure",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordType::Arrival => "Arrived",
            RecordType::Departure => "Departed",
        }
    }

    /// Arrivals sort before departures in a timeline.
    fn order(&self) -> u8 {
        match self {
            RecordType::Arrival => 0,
            RecordType::Departure => 1,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single arrival or departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub user_id: i64,
    pub record_type: RecordType,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address_id: Option<i64>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub has_photo: bool,
    /// Flattened address text, only sent by the per-day employee listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Record {
    /// `HH:MM` part of the timestamp, if it has one.
    pub fn time_display(&self) -> String {
        let Some(ts) = self.timestamp.as_deref() else {
            return "--:--".to_string();
        };
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
            return dt.format("%H:%M").to_string();
        }
        // Backend timestamps are usually naive local time
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f") {
            return dt.format("%H:%M").to_string();
        }
        "--:--".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
}

impl Address {
    pub fn from_formatted(text: &str) -> Self {
        Self {
            formatted_address: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn display(&self) -> String {
        if let Some(ref text) = self.formatted_address {
            return text.clone();
        }
        let parts: Vec<&str> = [&self.city, &self.street, &self.building]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            "Address unknown".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A record together with its resolved address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithAddress {
    pub record: Record,
    #[serde(default)]
    pub address: Option<Address>,
}

/// Response of `GET /api/records/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDetails {
    pub record: Record,
    pub user: User,
    #[serde(default)]
    pub address: Option<Address>,
}

/// Body of `POST /api/records`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRecordRequest {
    pub user_id: i64,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub latitude: f64,
    pub longitude: f64,
    pub comment: Option<String>,
}

/// Response of `POST /api/records`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    #[serde(default)]
    pub success: bool,
    pub record: Record,
}

/// Arrivals first, then departures, each by time.
pub fn sort_timeline(records: &mut [RecordWithAddress]) {
    records.sort_by(|a, b| {
        a.record
            .record_type
            .order()
            .cmp(&b.record.record_type.order())
            .then_with(|| a.record.timestamp.cmp(&b.record.timestamp))
    });
}
