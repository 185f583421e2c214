//! Data models for the attendance backend.
//!
//! - `User`, `AuthResponse`: people and login
//! - `Record`, `RecordType`, `Address`: arrivals/departures and where they happened
//! - `EmployeesResponse`, `EmployeeRecords`, `RecordDetails`: admin views
//! - `TodayStatus`, `CurrentLocationsResponse`: worker status and live map
//! - `ReportResponse`: discipline report confirmation

pub mod record;
pub mod report;
pub mod status;
pub mod user;

pub use record::{
    sort_timeline, Address, CreateRecordRequest, CreateRecordResponse, Record, RecordDetails,
    RecordType, RecordWithAddress,
};
pub use report::ReportResponse;
pub use status::{
    CurrentLocation, CurrentLocationsResponse, EmployeeRecords, EmployeeStatus, EmployeesResponse,
    StatusRecord, TodayStatus,
};
pub use user::{AuthResponse, User};
