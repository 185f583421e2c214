use serde::{Deserialize, Serialize};

use super::{sort_timeline, Address, Record, RecordDetails, RecordWithAddress, User};

/// One employee's arrival/departure for a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeStatus {
    pub user: User,
    #[serde(default)]
    pub arrival_record: Option<Record>,
    #[serde(default)]
    pub departure_record: Option<Record>,
}

impl EmployeeStatus {
    pub fn status_label(&self) -> &'static str {
        match (&self.arrival_record, &self.departure_record) {
            (None, None) => "absent",
            (Some(_), None) => "on site",
            (_, Some(_)) => "left",
        }
    }

    /// Rebuild the per-employee timeline the records endpoint would return.
    ///
    /// The listing only carries the address as flat text, so it is wrapped
    /// into an `Address` with just `formatted_address` set.
    pub fn to_employee_records(&self) -> EmployeeRecords {
        let records = [&self.arrival_record, &self.departure_record]
            .into_iter()
            .flatten()
            .map(|record| RecordWithAddress {
                record: record.clone(),
                address: record.address.as_deref().map(Address::from_formatted),
            })
            .collect();

        EmployeeRecords {
            user: self.user.clone(),
            records,
        }
    }
}

/// Response of `GET /api/employees?date=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeesResponse {
    pub date: String,
    #[serde(default)]
    pub employees: Vec<EmployeeStatus>,
}

/// Response of `GET /api/employees/{id}/records?date=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecords {
    pub user: User,
    #[serde(default)]
    pub records: Vec<RecordWithAddress>,
}

impl EmployeeRecords {
    pub fn timeline(&self) -> Vec<RecordWithAddress> {
        let mut records = self.records.clone();
        sort_timeline(&mut records);
        records
    }

    /// Detail views implied by this timeline, one per record.
    pub fn record_details(&self) -> Vec<RecordDetails> {
        self.records
            .iter()
            .map(|item| RecordDetails {
                record: item.record.clone(),
                user: self.user.clone(),
                address: item.address.clone(),
            })
            .collect()
    }
}

/// A record as summarised in the worker's own daily status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Response of `GET /api/user/today-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TodayStatus {
    #[serde(default)]
    pub has_arrival: bool,
    #[serde(default)]
    pub has_departure: bool,
    #[serde(default)]
    pub arrival_record: Option<StatusRecord>,
    #[serde(default)]
    pub departure_record: Option<StatusRecord>,
}

impl TodayStatus {
    pub fn record_count(&self) -> usize {
        usize::from(self.has_arrival) + usize::from(self.has_departure)
    }
}

/// One pin on the live staff map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentLocation {
    pub user: User,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Response of `GET /api/current-locations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CurrentLocationsResponse {
    #[serde(default)]
    pub locations: Vec<CurrentLocation>,
}
